/// The board and network dimensions that fix the size of every record and tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub input_planes: usize,
    pub board_size: usize,
    pub value_hidden: usize,
}

impl Geometry {
    /// 18 input planes on a 19x19 board with a 256 wide value head.
    pub const GO_19: Self = Self {
        input_planes: 18,
        board_size: 19,
        value_hidden: 256,
    };

    pub const fn squares(&self) -> usize {
        self.board_size * self.board_size
    }

    /// The amount of floats in a single input record.
    pub const fn input_len(&self) -> usize {
        self.input_planes * self.squares()
    }

    /// One entry per square plus one for passing.
    pub const fn policy_len(&self) -> usize {
        self.squares() + 1
    }

    /// The amount of floats in a single output record, the policy followed by the value.
    pub const fn output_len(&self) -> usize {
        self.policy_len() + 1
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::GO_19
    }
}

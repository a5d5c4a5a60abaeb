use std::fmt::{self, Display};

use rayon::prelude::*;

use super::{BASE_LINES, LINES_PER_BLOCK, Result, VERSION, WeightFormatErr};
use crate::Geometry;

/// Returns the expected length of every tensor of a network, in file order.
///
/// # Arguments
/// * `geometry` - The board and head dimensions.
/// * `blocks` - The amount of residual blocks.
/// * `filters` - The amount of convolution filters.
///
/// # Returns
/// One length per tensor line.
pub fn tensor_lens(geometry: &Geometry, blocks: usize, filters: usize) -> Vec<usize> {
    let squares = geometry.squares();
    let policy = geometry.policy_len();
    let hidden = geometry.value_hidden;

    // weights, biases, batch norm means and variances
    let conv = |lens: &mut Vec<usize>, inputs: usize, outputs: usize, kernel: usize| {
        lens.extend([inputs * outputs * kernel, outputs, outputs, outputs]);
    };

    let mut lens = Vec::with_capacity(BASE_LINES - 1 + LINES_PER_BLOCK * blocks);

    conv(&mut lens, geometry.input_planes, filters, 9);
    for _ in 0..2 * blocks {
        conv(&mut lens, filters, filters, 9);
    }

    conv(&mut lens, filters, 2, 1);
    lens.extend([2 * squares * policy, policy]);

    conv(&mut lens, filters, 1, 1);
    lens.extend([squares * hidden, hidden, hidden, 1]);

    lens
}

/// One complete set of network parameters, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSet {
    blocks: usize,
    filters: usize,
    tensors: Vec<Vec<f32>>,
}

impl WeightSet {
    /// Parses the contents of a weight file.
    ///
    /// Lines are parsed in parallel. A single trailing newline does not count as a line and
    /// `\r\n` line endings are accepted.
    ///
    /// # Arguments
    /// * `text` - The whole weight file.
    ///
    /// # Returns
    /// The parsed set or a `WeightFormatErr`. The shapes are not checked against any
    /// geometry, see `validate`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();

        let version = lines.next().unwrap_or_default().trim();
        if version != VERSION {
            return Err(WeightFormatErr::WrongVersion {
                found: version.to_string(),
            });
        }

        let lines: Vec<_> = lines.collect();
        blocks_for(lines.len() + 1)?;

        let tensors = lines
            .par_iter()
            .enumerate()
            .map(|(i, line)| parse_tensor(i + 1, line))
            .collect::<Result<Vec<_>>>()?;

        Self::from_tensors(tensors)
    }

    /// Builds a set from already parsed tensors, in file order.
    ///
    /// # Returns
    /// The new set or a `WeightFormatErr` if the amount of tensors is not that of a whole
    /// residual network.
    pub fn from_tensors(tensors: Vec<Vec<f32>>) -> Result<Self> {
        let blocks = blocks_for(tensors.len() + 1)?;
        let filters = tensors[1].len();

        Ok(Self {
            blocks,
            filters,
            tensors,
        })
    }

    /// Builds a set of the right shapes for `geometry` with every parameter set to `value`.
    pub fn constant(geometry: &Geometry, blocks: usize, filters: usize, value: f32) -> Self {
        let tensors = tensor_lens(geometry, blocks, filters)
            .into_iter()
            .map(|len| vec![value; len])
            .collect();

        Self {
            blocks,
            filters,
            tensors,
        }
    }

    /// Checks every tensor length against what `geometry` expects.
    ///
    /// # Returns
    /// A `ShapeMismatch` naming the first offending tensor.
    pub fn validate(&self, geometry: &Geometry) -> Result<()> {
        let expected = tensor_lens(geometry, self.blocks, self.filters);

        for (tensor, (values, expected)) in self.tensors.iter().zip(expected).enumerate() {
            if values.len() != expected {
                return Err(WeightFormatErr::ShapeMismatch {
                    tensor,
                    got: values.len(),
                    expected,
                });
            }
        }

        Ok(())
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    pub fn tensors(&self) -> &[Vec<f32>] {
        &self.tensors
    }

    /// Returns the total amount of parameters.
    pub fn len(&self) -> usize {
        self.tensors.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writes the set back in weight file format, floats in their shortest exact form.
impl Display for WeightSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{VERSION}")?;

        for tensor in &self.tensors {
            let mut values = tensor.iter();

            if let Some(value) = values.next() {
                write!(f, "{value}")?;
            }

            for value in values {
                write!(f, " {value}")?;
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

/// Returns the amount of residual blocks of a file with `lines` lines.
fn blocks_for(lines: usize) -> Result<usize> {
    if lines < BASE_LINES {
        return Err(WeightFormatErr::TooShort { lines });
    }

    let extra = lines - BASE_LINES;
    if extra % LINES_PER_BLOCK != 0 {
        return Err(WeightFormatErr::InconsistentLayers { lines });
    }

    Ok(extra / LINES_PER_BLOCK)
}

fn parse_tensor(line: usize, text: &str) -> Result<Vec<f32>> {
    text.split_whitespace()
        .map(|token| {
            token.parse().map_err(|_| WeightFormatErr::BadFloat {
                line,
                token: token.to_string(),
            })
        })
        .collect()
}

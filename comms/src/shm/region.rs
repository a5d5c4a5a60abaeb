use std::{
    ffi::CString,
    fs::File,
    io,
    os::fd::FromRawFd,
    ptr,
};

use memmap2::MmapRaw;

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn shm_open(name: &str, oflag: libc::c_int) -> io::Result<File> {
    let c_name = c_name(name)?;
    // SAFETY: `c_name` is a valid nul terminated string.
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), oflag, 0o600 as libc::mode_t) };

    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `fd` is a freshly opened descriptor owned by nobody else.
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// A named POSIX shared memory region mapped into this process.
///
/// Accesses are bounds checked but not synchronized, callers order them through the
/// semaphore handshake.
pub struct SharedRegion {
    map: MmapRaw,
    name: String,
}

impl SharedRegion {
    /// Creates and maps a zeroed region, replacing any stale one with the same name.
    ///
    /// # Arguments
    /// * `name` - The region name, starting with a slash.
    /// * `size` - The size of the region in bytes.
    ///
    /// # Returns
    /// The mapped region or an io error.
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        Self::unlink(name)?;

        let file = shm_open(name, libc::O_CREAT | libc::O_EXCL | libc::O_RDWR)?;
        file.set_len(size as u64)?;

        Self::map(&file, name)
    }

    /// Maps an existing region with its current size.
    ///
    /// # Arguments
    /// * `name` - The region name, starting with a slash.
    ///
    /// # Returns
    /// The mapped region or an io error, `NotFound` if it does not exist.
    pub fn open(name: &str) -> io::Result<Self> {
        let file = shm_open(name, libc::O_RDWR)?;
        Self::map(&file, name)
    }

    fn map(file: &File, name: &str) -> io::Result<Self> {
        Ok(Self {
            map: MmapRaw::map_raw(file)?,
            name: name.to_string(),
        })
    }

    /// Removes the name of a region, doing nothing if it does not exist.
    pub fn unlink(name: &str) -> io::Result<()> {
        let c_name = c_name(name)?;
        // SAFETY: `c_name` is a valid nul terminated string.
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } == 0 {
            return Ok(());
        }

        match io::Error::last_os_error() {
            e if e.kind() == io::ErrorKind::NotFound => Ok(()),
            e => Err(e),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    fn check_bounds(&self, offset: usize, len: usize) -> io::Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "access of {len} bytes at {offset} exceeds region {} of {} bytes",
                    self.name,
                    self.len()
                ),
            )),
        }
    }

    /// Copies `dst.len()` bytes starting at `offset` into `dst`.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> io::Result<()> {
        self.check_bounds(offset, dst.len())?;
        // SAFETY: the range was bounds checked and `dst` cannot overlap the mapping.
        unsafe {
            ptr::copy_nonoverlapping(self.map.as_ptr().add(offset), dst.as_mut_ptr(), dst.len())
        };
        Ok(())
    }

    /// Copies `src` into the region starting at `offset`.
    pub fn write(&self, offset: usize, src: &[u8]) -> io::Result<()> {
        self.check_bounds(offset, src.len())?;
        // SAFETY: the range was bounds checked and `src` cannot overlap the mapping.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.map.as_mut_ptr().add(offset), src.len())
        };
        Ok(())
    }

    pub fn read_f32s(&self, offset: usize, dst: &mut [f32]) -> io::Result<()> {
        self.read(offset, bytemuck::cast_slice_mut(dst))
    }

    pub fn write_f32s(&self, offset: usize, src: &[f32]) -> io::Result<()> {
        self.write(offset, bytemuck::cast_slice(src))
    }

    pub fn read_u32(&self, offset: usize) -> io::Result<u32> {
        let mut buf = [0; 4];
        self.read(offset, &mut buf)?;
        Ok(u32::from_ne_bytes(buf))
    }

    pub fn write_u32(&self, offset: usize, value: u32) -> io::Result<()> {
        self.write(offset, &value.to_ne_bytes())
    }
}

use std::{ffi::CString, io};

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// A named POSIX semaphore.
pub struct Semaphore {
    sem: *mut libc::sem_t,
    name: String,
}

// SAFETY: posix semaphores are meant to be operated on concurrently from any thread.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Creates a new semaphore with a value of zero, replacing any stale one with the same name.
    ///
    /// # Arguments
    /// * `name` - The semaphore name, starting with a slash.
    ///
    /// # Returns
    /// The created semaphore or an io error.
    pub fn create(name: &str) -> io::Result<Self> {
        Self::unlink(name)?;

        let c_name = c_name(name)?;
        // SAFETY: `c_name` is a valid nul terminated string, mode and value are passed as
        // `c_uint` as the variadic signature expects.
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                0 as libc::c_uint,
            )
        };

        Self::from_raw(sem, name)
    }

    /// Opens an existing semaphore.
    ///
    /// # Arguments
    /// * `name` - The semaphore name, starting with a slash.
    ///
    /// # Returns
    /// The opened semaphore or an io error, `NotFound` if it does not exist.
    pub fn open(name: &str) -> io::Result<Self> {
        let c_name = c_name(name)?;
        // SAFETY: `c_name` is a valid nul terminated string.
        let sem = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        Self::from_raw(sem, name)
    }

    fn from_raw(sem: *mut libc::sem_t, name: &str) -> io::Result<Self> {
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            sem,
            name: name.to_string(),
        })
    }

    /// Removes the name of a semaphore, doing nothing if it does not exist.
    pub fn unlink(name: &str) -> io::Result<()> {
        let c_name = c_name(name)?;
        // SAFETY: `c_name` is a valid nul terminated string.
        if unsafe { libc::sem_unlink(c_name.as_ptr()) } == 0 {
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

    /// Blocks until the semaphore can be decremented.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            // SAFETY: `self.sem` was returned by a successful `sem_open`.
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }

            let e = io::Error::last_os_error();
            if e.kind() != io::ErrorKind::Interrupted {
                return Err(e);
            }
        }
    }

    /// Decrements the semaphore if it can be done without blocking.
    ///
    /// # Returns
    /// Whether the semaphore was decremented.
    pub fn try_wait(&self) -> io::Result<bool> {
        loop {
            // SAFETY: `self.sem` was returned by a successful `sem_open`.
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }

            let e = io::Error::last_os_error();
            match e.kind() {
                io::ErrorKind::WouldBlock => return Ok(false),
                io::ErrorKind::Interrupted => continue,
                _ => return Err(e),
            }
        }
    }

    /// Increments the semaphore, waking one waiter.
    pub fn post(&self) -> io::Result<()> {
        // SAFETY: `self.sem` was returned by a successful `sem_open`.
        if unsafe { libc::sem_post(self.sem) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // SAFETY: `self.sem` was returned by a successful `sem_open` and is closed only once.
        unsafe { libc::sem_close(self.sem) };
    }
}

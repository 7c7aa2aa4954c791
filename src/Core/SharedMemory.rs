// Shared memory segments backing the fast-box pool.
// Two flavours: a named file under /dev/shm that a peer process can map by
// name, and an anonymous MAP_SHARED mapping that survives fork().

use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::ptr::{self, NonNull};

/// Every segment base handed out is aligned to this many bytes.
pub const SEGMENT_ALIGNMENT: usize = 128;

/// Shared memory backend trait for mapped fast-box segments
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Get a pointer to the (aligned) start of the mapped region
    fn as_ptr(&self) -> *mut u8;

    /// Get the usable size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Get the underlying OS handle
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Unix file descriptor of a named segment
    Fd(i32),
    /// Anonymous mapping, no descriptor
    Anonymous,
}

/// Create a named segment of `size` usable bytes under /dev/shm.
#[cfg(target_os = "linux")]
pub fn create_shared_memory(size: usize, name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(NamedSharedMemory::create(size, name)?))
}

/// Map an existing named segment created by a peer.
#[cfg(target_os = "linux")]
pub fn attach_shared_memory(name: &str, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(NamedSharedMemory::attach(name, size)?))
}

/// Create an anonymous shared mapping. Visible to children forked after the call.
pub fn create_anonymous_shared_memory(size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(AnonymousSharedMemory::create(size)?))
}

#[cfg(not(target_os = "linux"))]
pub fn create_shared_memory(_size: usize, _name: &str) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Named shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn attach_shared_memory(_name: &str, _size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Named shared memory only supported on Linux",
    ))
}

/// Remove the /dev/shm entry for a named segment. Existing mappings stay valid.
#[cfg(target_os = "linux")]
pub fn unlink_shared_memory(name: &str) -> io::Result<()> {
    std::fs::remove_file(shm_path(name))
}

#[cfg(target_os = "linux")]
fn shm_path(name: &str) -> String {
    format!("/dev/shm/{}", name)
}

/// mmap `len` bytes and round the start up to SEGMENT_ALIGNMENT.
/// Returns (aligned, original) so Drop can unmap what the kernel gave us.
unsafe fn map_aligned(len: usize, flags: libc::c_int, fd: libc::c_int) -> io::Result<(NonNull<u8>, *mut u8)> {
    let ptr = libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        flags,
        fd,
        0,
    );

    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }

    let aligned = ((ptr as usize + SEGMENT_ALIGNMENT - 1) & !(SEGMENT_ALIGNMENT - 1)) as *mut u8;
    let aligned = NonNull::new(aligned)
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"))?;
    Ok((aligned, ptr as *mut u8))
}

#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct NamedSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    fd: i32,
    mapping: (*mut u8, usize),
}

#[cfg(target_os = "linux")]
unsafe impl Send for NamedSharedMemory {}
#[cfg(target_os = "linux")]
unsafe impl Sync for NamedSharedMemory {}

#[cfg(target_os = "linux")]
impl NamedSharedMemory {
    /// Create (or truncate) `/dev/shm/<name>` and map it.
    pub fn create(size: usize, name: &str) -> io::Result<Self> {
        let path = shm_path(name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to create shared memory file at {}: {}", path, e),
                )
            })?;

        // Back the alignment slack with real pages so touching it cannot SIGBUS.
        let total_size = size + SEGMENT_ALIGNMENT - 1;
        if unsafe { libc::ftruncate(file.as_raw_fd(), total_size as libc::off_t) } != 0 {
            return Err(io::Error::last_os_error());
        }

        Self::map_file(file, size, total_size)
    }

    /// Map an existing `/dev/shm/<name>` that holds at least `size` usable bytes.
    pub fn attach(name: &str, size: usize) -> io::Result<Self> {
        let path = shm_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Failed to open shared memory at {}: {}", path, e),
                )
            })?;

        let total_size = file.metadata()?.len() as usize;
        if total_size < size + SEGMENT_ALIGNMENT - 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Shared memory size too small: expected at least {} bytes, got {}",
                    size + SEGMENT_ALIGNMENT - 1,
                    total_size
                ),
            ));
        }

        Self::map_file(file, size, total_size)
    }

    fn map_file(file: std::fs::File, size: usize, total_size: usize) -> io::Result<Self> {
        let fd = file.into_raw_fd();
        let (ptr, original) = match unsafe { map_aligned(total_size, libc::MAP_SHARED, fd) } {
            Ok(mapped) => mapped,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        Ok(Self {
            ptr,
            size,
            fd,
            mapping: (original, total_size),
        })
    }
}

#[cfg(target_os = "linux")]
impl Drop for NamedSharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mapping.0 as *mut libc::c_void, self.mapping.1);
            libc::close(self.fd);
        }
    }
}

#[cfg(target_os = "linux")]
impl SharedMemoryBackend for NamedSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Fd(self.fd)
    }
}

/// MAP_SHARED | MAP_ANONYMOUS region. Zero filled by the kernel.
#[derive(Debug)]
pub struct AnonymousSharedMemory {
    ptr: NonNull<u8>,
    size: usize,
    mapping: (*mut u8, usize),
}

unsafe impl Send for AnonymousSharedMemory {}
unsafe impl Sync for AnonymousSharedMemory {}

impl AnonymousSharedMemory {
    pub fn create(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Shared memory size must be non-zero",
            ));
        }

        let total_size = size + SEGMENT_ALIGNMENT - 1;
        let (ptr, original) =
            unsafe { map_aligned(total_size, libc::MAP_SHARED | libc::MAP_ANONYMOUS, -1)? };

        Ok(Self {
            ptr,
            size,
            mapping: (original, total_size),
        })
    }
}

impl Drop for AnonymousSharedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mapping.0 as *mut libc::c_void, self.mapping.1);
        }
    }
}

impl SharedMemoryBackend for AnonymousSharedMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Anonymous
    }
}

use std::fmt;

/// Identifier of an accelerator. Host memory conventionally uses device `0`.
pub type DeviceId = usize;

/// Where a buffer lives, and whether host memory is page-locked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    /// Pageable host memory
    Host,
    /// Page-locked host memory, eligible for asynchronous device transfers
    PinnedHost,
    /// Accelerator-resident memory
    Device,
}

impl MemorySpace {
    /// Whether the host can address this memory directly.
    pub fn is_host(&self) -> bool {
        matches!(self, MemorySpace::Host | MemorySpace::PinnedHost)
    }
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemorySpace::Host => write!(f, "host"),
            MemorySpace::PinnedHost => write!(f, "pinned-host"),
            MemorySpace::Device => write!(f, "device"),
        }
    }
}

/// A memory space paired with the device that owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryLocation {
    pub space: MemorySpace,
    pub device: DeviceId,
}

impl MemoryLocation {
    pub fn new(space: MemorySpace, device: DeviceId) -> Self {
        Self { space, device }
    }

    /// Pageable host memory
    pub fn host() -> Self {
        Self::new(MemorySpace::Host, 0)
    }

    /// Page-locked host memory
    pub fn pinned() -> Self {
        Self::new(MemorySpace::PinnedHost, 0)
    }

    /// Memory resident on accelerator `device`
    pub fn device(device: DeviceId) -> Self {
        Self::new(MemorySpace::Device, device)
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.device)
    }
}

use core::fmt;
use spin::Mutex;

/// Upper bound on tracked components; the table never allocates.
pub const MAX_COMPONENTS: usize = 16;

/// Kernel initialization status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(&'static str),
}

/// Kernel component status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatusTable {
    entries: [Option<ComponentStatus>; MAX_COMPONENTS],
    len: usize,
}

impl StatusTable {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_COMPONENTS],
            len: 0,
        }
    }

    /// False when the table is full. Registering a name twice keeps the
    /// existing entry.
    pub fn register(&mut self, name: &'static str) -> bool {
        if self.get(name).is_some() {
            return true;
        }
        if self.len == MAX_COMPONENTS {
            return false;
        }
        self.entries[self.len] = Some(ComponentStatus::new(name));
        self.len += 1;
        true
    }

    pub fn update(&mut self, name: &'static str, status: InitStatus) -> bool {
        match self.entries[..self.len].iter_mut().flatten().find(|c| c.name == name) {
            Some(component) => {
                component.status = status;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<InitStatus> {
        self.iter().find(|c| c.name == name).map(|c| c.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentStatus> {
        self.entries[..self.len].iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn all_ready(&self) -> bool {
        !self.is_empty() && self.iter().all(ComponentStatus::is_complete)
    }

    pub fn first_failure(&self) -> Option<&ComponentStatus> {
        self.iter().find(|c| c.is_failed())
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) static INIT_STATUS: Mutex<StatusTable> = Mutex::new(StatusTable::new());

/// Snapshot of every component
pub fn get_all_statuses() -> StatusTable {
    *INIT_STATUS.lock()
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}

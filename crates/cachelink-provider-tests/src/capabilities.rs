/// Optional guarantees exercised by the suite.
#[derive(Clone, Copy, Debug)]
pub struct Capabilities {
    /// Concurrent writes to one key land in issue order.
    pub ordered_writes: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            ordered_writes: true,
        }
    }
}

impl Capabilities {
    pub const fn unordered_writes(mut self) -> Self {
        self.ordered_writes = false;
        self
    }
}

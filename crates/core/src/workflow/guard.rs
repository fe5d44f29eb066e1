/// Read-side resubmission ceiling. The count is the ticket-lifetime number
/// of rejected approval records, across all passes; the guard never mutates
/// anything, the workflow service blocks by consulting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResubmissionGuard {
    ceiling: u32,
}

impl ResubmissionGuard {
    pub const DEFAULT_CEILING: u32 = 3;

    pub fn new(ceiling: u32) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn remaining(&self, rejected_count: u32) -> u32 {
        self.ceiling.saturating_sub(rejected_count)
    }

    pub fn allows(&self, rejected_count: u32) -> bool {
        self.remaining(rejected_count) > 0
    }
}

impl Default for ResubmissionGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CEILING)
    }
}

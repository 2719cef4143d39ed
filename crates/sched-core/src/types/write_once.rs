//! A field that can be assigned exactly once between resets.
//!
//! Several entity fields (a job's time limit, a job's owning campaign) are
//! fixed by the part that creates the entity and must never be overwritten
//! afterwards; reading one before it's set, or setting one twice, is a
//! caller bug, not a runtime condition to recover from.

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOnce<T>(Option<T>);

impl<T: Copy> WriteOnce<T> {
    pub fn unset() -> Self {
        Self(None)
    }

    pub fn set(&mut self, value: T) {
        assert!(self.0.is_none(), "write-once field assigned twice");
        self.0 = Some(value);
    }

    pub fn get(&self) -> T {
        self.0.expect("write-once field read before assignment")
    }

    pub fn get_opt(&self) -> Option<T> {
        self.0
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    /// Clears the field so it can be assigned again; used when an entity
    /// slot is recycled.
    pub fn reset(&mut self) {
        self.0 = None;
    }
}

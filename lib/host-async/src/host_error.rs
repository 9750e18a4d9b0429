/// Size of the host error buffer, terminator included.
pub const HOST_ERROR_CAPACITY: usize = 1024;

/// Last error reported by the host for a guest-visible call.
///
/// The host sets it before returning a failure; the glue turns a non-empty
/// slot into a guest exception and clears it. Messages longer than
/// `HOST_ERROR_CAPACITY - 1` bytes are cut at a character boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostErrorSlot {
    message: String,
}

impl HostErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `message`, or clears the slot for `None`.
    pub fn set(&mut self, message: Option<&str>) {
        self.message.clear();
        if let Some(message) = message {
            let cut = truncate_at_boundary(message, HOST_ERROR_CAPACITY - 1);
            self.message.push_str(cut);
        }
    }

    pub fn get(&self) -> Option<&str> {
        (!self.message.is_empty()).then_some(self.message.as_str())
    }

    pub fn clear(&mut self) {
        self.message.clear();
    }

    pub fn take(&mut self) -> Option<String> {
        if self.message.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.message))
    }
}

fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let mut slot = HostErrorSlot::new();
        assert_eq!(slot.get(), None);
        slot.set(Some("lookup failed"));
        assert_eq!(slot.get(), Some("lookup failed"));
        slot.set(None);
        assert_eq!(slot.get(), None);

        slot.set(Some("again"));
        assert_eq!(slot.take().as_deref(), Some("again"));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn long_messages_are_truncated() {
        let mut slot = HostErrorSlot::new();
        slot.set(Some(&"x".repeat(5000)));
        assert_eq!(slot.get().unwrap().len(), HOST_ERROR_CAPACITY - 1);

        // 'ß' is two bytes; 1022 ASCII bytes + 'ß' does not fit
        let msg = format!("{}ß", "y".repeat(HOST_ERROR_CAPACITY - 2));
        slot.set(Some(&msg));
        assert_eq!(slot.get().unwrap().len(), HOST_ERROR_CAPACITY - 2);
    }
}

//! RowStatus textual convention (RFC 1903).

use std::fmt;

/// Conceptual row lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RowStatus {
    Active = 1,
    NotInService = 2,
    NotReady = 3,
    CreateAndGo = 4,
    CreateAndWait = 5,
    Destroy = 6,
}

impl RowStatus {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Active),
            2 => Some(Self::NotInService),
            3 => Some(Self::NotReady),
            4 => Some(Self::CreateAndGo),
            5 => Some(Self::CreateAndWait),
            6 => Some(Self::Destroy),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Status a row reports once this request value has been applied.
    ///
    /// `Destroy` has no effective status; the row disappears.
    pub fn effective(self) -> Option<Self> {
        match self {
            Self::CreateAndGo => Some(Self::Active),
            Self::CreateAndWait => Some(Self::NotInService),
            Self::Destroy => None,
            other => Some(other),
        }
    }

    /// Whether a manager may write `requested` to a row currently in
    /// `current` (`None` when the row does not exist yet).
    ///
    /// `notReady` is never writable, the create actions only apply to absent
    /// rows, and activation toggles only apply to existing ones. Destroying
    /// an absent row is accepted and does nothing.
    pub fn accepts(current: Option<Self>, requested: Self) -> bool {
        match (current, requested) {
            (_, Self::NotReady) => false,
            (_, Self::Destroy) => true,
            (None, Self::CreateAndGo | Self::CreateAndWait) => true,
            (None, _) => false,
            (Some(_), Self::CreateAndGo | Self::CreateAndWait) => false,
            (Some(_), Self::Active | Self::NotInService) => true,
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::NotInService => "notInService",
            Self::NotReady => "notReady",
            Self::CreateAndGo => "createAndGo",
            Self::CreateAndWait => "createAndWait",
            Self::Destroy => "destroy",
        };
        write!(f, "{}({})", name, self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_status() {
        assert_eq!(RowStatus::CreateAndGo.effective(), Some(RowStatus::Active));
        assert_eq!(RowStatus::CreateAndWait.effective(), Some(RowStatus::NotInService));
        assert_eq!(RowStatus::Destroy.effective(), None);
        assert_eq!(RowStatus::NotInService.effective(), Some(RowStatus::NotInService));
    }

    #[test]
    fn test_accepted_transitions() {
        use RowStatus::*;
        assert!(RowStatus::accepts(None, CreateAndGo));
        assert!(RowStatus::accepts(None, CreateAndWait));
        assert!(RowStatus::accepts(None, Destroy));
        assert!(!RowStatus::accepts(None, Active));
        assert!(!RowStatus::accepts(Some(Active), CreateAndGo));
        assert!(RowStatus::accepts(Some(Active), NotInService));
        assert!(RowStatus::accepts(Some(NotInService), Active));
        assert!(RowStatus::accepts(Some(Active), Destroy));
        assert!(!RowStatus::accepts(Some(Active), NotReady));
    }

    #[test]
    fn test_wire_values() {
        for value in 1..=6 {
            assert_eq!(RowStatus::from_i32(value).unwrap().as_i32(), value);
        }
        assert!(RowStatus::from_i32(0).is_none());
        assert!(RowStatus::from_i32(7).is_none());
        assert_eq!(RowStatus::CreateAndGo.to_string(), "createAndGo(4)");
    }
}

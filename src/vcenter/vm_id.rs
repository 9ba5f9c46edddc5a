//! Parsing/rendering of the `VirtualMachine:<id>` VM reference form
//! (spec.md §3).

/// A virtualization-cluster managed-object reference of kind
/// `VirtualMachine`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VmId(String);

const PREFIX: &str = "VirtualMachine:";

impl VmId {
    pub fn parse(s: &str) -> Option<Self> {
        if s.starts_with(PREFIX) && s.len() > PREFIX.len() {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//! Value kinds known to the store.

use std::fmt;

/// Closed set of value kinds a store can report.
///
/// Raw codes follow the host registry numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// No data.
    None,
    /// Terminated UTF-16 string.
    String,
    /// String holding unexpanded environment references.
    ExpandString,
    /// Arbitrary bytes.
    Binary,
    /// 32-bit little-endian integer.
    Dword,
    /// 32-bit big-endian integer.
    DwordBigEndian,
    /// Symbolic link target.
    Link,
    /// Sequence of terminated strings.
    MultiString,
    /// Device driver resource list.
    ResourceList,
    /// Hardware resource descriptor.
    FullResourceDescriptor,
    /// Hardware resource requirements.
    ResourceRequirementsList,
    /// 64-bit little-endian integer.
    Qword,
}

impl ValueKind {
    /// Every kind, in raw code order.
    pub const ALL: [Self; 12] = [
        Self::None,
        Self::String,
        Self::ExpandString,
        Self::Binary,
        Self::Dword,
        Self::DwordBigEndian,
        Self::Link,
        Self::MultiString,
        Self::ResourceList,
        Self::FullResourceDescriptor,
        Self::ResourceRequirementsList,
        Self::Qword,
    ];

    /// Raw code as reported by the host.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::String => 1,
            Self::ExpandString => 2,
            Self::Binary => 3,
            Self::Dword => 4,
            Self::DwordBigEndian => 5,
            Self::Link => 6,
            Self::MultiString => 7,
            Self::ResourceList => 8,
            Self::FullResourceDescriptor => 9,
            Self::ResourceRequirementsList => 10,
            Self::Qword => 11,
        }
    }

    /// Look up a kind by raw code.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    /// Display tag used in entries and type filters.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::String => "REG_SZ",
            Self::ExpandString => "REG_EXPAND_SZ",
            Self::Binary => "REG_BINARY",
            Self::Dword => "REG_DWORD",
            Self::DwordBigEndian => "REG_DWORD_BIG_ENDIAN",
            Self::Link => "REG_LINK",
            Self::MultiString => "REG_MULTI_SZ",
            Self::ResourceList => "REG_RESOURCE_LIST",
            Self::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR",
            Self::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST",
            Self::Qword => "REG_QWORD",
        }
    }

    /// Look up a kind by display tag (exact match).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// All display tags, in raw code order.
    #[must_use]
    pub fn tags() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.tag()).collect()
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What kind of region a marker opens, or what kind of deferred reference it
/// records, at a given byte offset in a property's raw value.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MarkerKind {
    StartBytes,
    StartU16,
    StartU32,
    StartU64,
    StartString,
    RefPath,
    RefPhandle,
    RefLabel,
}

impl MarkerKind {
    pub fn is_ref(&self) -> bool {
        matches!(
            self,
            MarkerKind::RefPath | MarkerKind::RefPhandle | MarkerKind::RefLabel
        )
    }

    /// Element width in bytes for the typed-region start markers. `None`
    /// for reference markers, which don't open a fixed-width region.
    pub fn element_width(&self) -> Option<usize> {
        match self {
            MarkerKind::StartBytes | MarkerKind::StartString => Some(1),
            MarkerKind::StartU16 => Some(2),
            MarkerKind::StartU32 => Some(4),
            MarkerKind::StartU64 => Some(8),
            _ => None,
        }
    }
}

/// An offset-tagged annotation on a property's raw value: either the start
/// of a typed region, or a pending/ resolved cross-reference. `reference`
/// carries the `&label` / `&{path}` text for REF-* markers; it is `None`
/// for START-* markers.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Marker {
    pub offset: usize,
    pub kind: MarkerKind,
    pub reference: Option<String>,
}

impl Marker {
    pub fn start(offset: usize, kind: MarkerKind) -> Marker {
        debug_assert!(!kind.is_ref());
        Marker {
            offset,
            kind,
            reference: None,
        }
    }

    pub fn reference(offset: usize, kind: MarkerKind, reference: impl Into<String>) -> Marker {
        debug_assert!(kind.is_ref());
        Marker {
            offset,
            kind,
            reference: Some(reference.into()),
        }
    }
}

//! Per-operation transfer context (the data transfer property list).
//!
//! Every cache call that may touch storage takes a [`TransferContext`]
//! explicitly; there is no process-wide default.

/// I/O mode of an operation in a multi-process setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferMode {
    /// Each process performs its own I/O.
    #[default]
    Independent,
    /// All cooperating processes take part in the I/O together.
    Collective,
}

/// Transfer properties threaded through `load`, `flush` and the
/// write-permission check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferContext {
    /// Independent or collective transfer.
    pub mode: TransferMode,
    /// Free-form label used in log output.
    pub label: Option<String>,
}

impl TransferContext {
    /// Create an independent context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent transfer.
    pub fn independent() -> Self {
        Self::new()
    }

    /// Collective transfer.
    pub fn collective() -> Self {
        Self::new().mode(TransferMode::Collective)
    }

    /// Set the transfer mode.
    pub fn mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attach a label for log output.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether this is a collective transfer.
    pub fn is_collective(&self) -> bool {
        self.mode == TransferMode::Collective
    }

    pub(crate) fn label_str(&self) -> &str {
        self.label.as_deref().unwrap_or("-")
    }
}

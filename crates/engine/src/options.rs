use std::collections::BTreeSet;

/// Controls for [`Engine::fork`](crate::Engine::fork) and
/// [`Engine::reset`](crate::Engine::reset).
#[derive(Debug, Clone)]
pub struct ForkOptions {
    /// Explicit accessor set. `None` selects the model's defaults.
    pub fields: Option<BTreeSet<String>>,
    /// Accessors to leave untouched. `"pk"` expands to the model's
    /// primary key name. Only applied when `fields` is `None`.
    pub exclude: Vec<String>,
    /// Follow relationships recursively, copying related rows too.
    pub deep: bool,
    /// Persist the result before returning.
    pub commit: bool,
}

impl Default for ForkOptions {
    fn default() -> Self {
        Self {
            fields: None,
            exclude: vec!["pk".to_owned()],
            deep: false,
            commit: true,
        }
    }
}

impl ForkOptions {
    /// Options for a recursive step: depth carries over, field
    /// selection and commit do not.
    pub(crate) fn nested(&self) -> Self {
        Self {
            deep: self.deep,
            commit: false,
            ..Self::default()
        }
    }
}

/// Controls for [`Engine::diff`](crate::Engine::diff).
#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub fields: Option<BTreeSet<String>>,
    pub exclude: Vec<String>,
    /// Recurse into direct to-one relationships and report their
    /// differences as nested maps.
    pub deep: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            fields: None,
            exclude: vec!["pk".to_owned()],
            deep: false,
        }
    }
}

/// The subset of a live relation's catalog state the checker needs before it
/// is safe to touch a single page.
///
/// Locking, buffer-manager pinning and the SQL-exposed entry point that would
/// normally produce this handle are the host's job; the checker only consumes
/// the four predicates below.
pub trait IndexHandle {
    fn is_gin(&self) -> bool;
    fn is_valid(&self) -> bool;
    fn is_other_session_temp(&self) -> bool;
    fn name(&self) -> &str;
}

/// A minimal, directly constructible `IndexHandle`, used by the test suite
/// and by callers that already know their relation is a live, valid GIN index.
pub struct RelationEntry {
    name: String,
    is_gin: bool,
    is_valid: bool,
    is_other_session_temp: bool,
}

impl RelationEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            is_gin: true,
            is_valid: true,
            is_other_session_temp: false,
        }
    }

    pub fn not_gin(mut self) -> Self {
        self.is_gin = false;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.is_valid = false;
        self
    }

    pub fn other_session_temp(mut self) -> Self {
        self.is_other_session_temp = true;
        self
    }
}

impl IndexHandle for RelationEntry {
    fn is_gin(&self) -> bool {
        self.is_gin
    }

    fn is_valid(&self) -> bool {
        self.is_valid
    }

    fn is_other_session_temp(&self) -> bool {
        self.is_other_session_temp
    }

    fn name(&self) -> &str {
        &self.name
    }
}

use crate::inflector::Inflector;
use std::fmt::{Display, Formatter};

/// Name of a slice or an application, in its underscored and namespace forms.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct SliceName {
    name: String,
    namespace_name: String,
}

impl SliceName {
    /// Accepts both forms - `"admin"` and `"Admin"` produce the same name.
    pub fn new(name: &str, inflector: &Inflector) -> Self {
        Self {
            name: inflector.underscore(name),
            namespace_name: inflector.camelize(name),
        }
    }

    /// Underscored name, e.g. `test_app`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace name, e.g. `TestApp`.
    #[inline]
    pub fn namespace_name(&self) -> &str {
        &self.namespace_name
    }
}

impl Display for SliceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

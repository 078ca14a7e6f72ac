//! Lazy constant resolution. Directories are bound to namespaces with
//! [push_dir](Autoloader::push_dir) and indexed once by [setup](Autoloader::setup), after which
//! every file can be found by its constant name, e.g. `lib/index_entity.rs` bound to `Search`
//! becomes `Search::IndexEntity`.

use crate::inflector::{Inflector, CONSTANT_SEPARATOR};
use fxhash::FxHashMap;
use std::iter::once;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum AutoloadError {
    #[error("Cannot push '{}' to an autoloader which has already been set up", .0.display())]
    AlreadySetUp(PathBuf),
    #[error("Autoload directory does not exist: {}", .0.display())]
    MissingDir(PathBuf),
    #[error("Error scanning autoload directory '{}': {source}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Directory bound to a namespace.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AutoloadDir {
    pub path: PathBuf,
    pub namespace: String,
}

#[derive(Debug, Default)]
pub struct Autoloader {
    dirs: Vec<AutoloadDir>,
    constants: FxHashMap<String, PathBuf>,
    set_up: bool,
}

impl Autoloader {
    /// Binds a directory to a namespace. Pushing the same binding twice is a no-op.
    pub fn push_dir<P: Into<PathBuf>, T: ToString>(
        &mut self,
        path: P,
        namespace: T,
    ) -> Result<(), AutoloadError> {
        let dir = AutoloadDir {
            path: path.into(),
            namespace: namespace.to_string(),
        };

        if self.set_up {
            return Err(AutoloadError::AlreadySetUp(dir.path));
        }

        if !self.dirs.contains(&dir) {
            debug!(
                path = %dir.path.display(),
                namespace = %dir.namespace,
                "Pushing autoload dir"
            );
            self.dirs.push(dir);
        }

        Ok(())
    }

    /// Indexes all pushed directories. Subsequent calls are no-ops.
    pub fn setup(&mut self, inflector: &Inflector) -> Result<(), AutoloadError> {
        if self.set_up {
            return Ok(());
        }

        let mut constants = FxHashMap::default();
        for dir in &self.dirs {
            if !dir.path.is_dir() {
                return Err(AutoloadError::MissingDir(dir.path.clone()));
            }

            for (constant, path) in index_dir(&dir.path, &dir.namespace, inflector)? {
                constants.entry(constant).or_insert(path);
            }
        }

        debug!(constants = constants.len(), "Autoloader set up");

        self.constants = constants;
        self.set_up = true;

        Ok(())
    }

    #[inline]
    pub fn is_set_up(&self) -> bool {
        self.set_up
    }

    #[inline]
    pub fn dirs(&self) -> &[AutoloadDir] {
        &self.dirs
    }

    /// Returns the file defining given constant. Always `None` before setup.
    pub fn constant_path(&self, constant: &str) -> Option<&Path> {
        self.constants.get(constant).map(PathBuf::as_path)
    }
}

fn index_dir(
    root: &Path,
    namespace: &str,
    inflector: &Inflector,
) -> Result<Vec<(String, PathBuf)>, AutoloadError> {
    let mut result = vec![];
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| AutoloadError::Scan {
            path: root.to_path_buf(),
            source,
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };

        if let Some(segments) = namespaced_segments(relative, namespace, inflector) {
            result.push((constant_name(namespace, &segments), entry.path().to_path_buf()));
        }
    }

    Ok(result)
}

/// Constant segments of a file in a directory bound to `namespace`. A leading directory named
/// after the namespace is dropped, so `admin/test_op.rs` bound to `Admin` gives `["TestOp"]`.
pub(crate) fn namespaced_segments(
    relative: &Path,
    namespace: &str,
    inflector: &Inflector,
) -> Option<Vec<String>> {
    let mut segments = constant_segments(relative, inflector)?;
    if segments.len() > 1 && segments[0] == namespace {
        segments.remove(0);
    }

    Some(segments)
}

/// Joins segments under a namespace, e.g. `Admin::Api::UserRepo`.
pub(crate) fn constant_name(namespace: &str, segments: &[String]) -> String {
    once(namespace)
        .filter(|namespace| !namespace.is_empty())
        .chain(segments.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(CONSTANT_SEPARATOR)
}

/// Camelized path segments of a file relative to its root, e.g. `api/user_repo.rs` ->
/// `["Api", "UserRepo"]`. Hidden files have no constant.
fn constant_segments(
    relative: &Path,
    inflector: &Inflector,
) -> Option<Vec<String>> {
    let stem = relative.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }

    let mut segments = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .map(|component| component.as_os_str().to_str().map(|dir| inflector.camelize(dir)))
        .collect::<Option<Vec<_>>>()?;

    segments.push(inflector.camelize(stem));
    Some(segments)
}

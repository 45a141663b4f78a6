//! Path-to-project resolution.
//!
//! Project roots are assumed not to nest, so the first root containing a
//! path owns it.

use std::ffi::OsStr;
use std::path::{Component, Path};

/// Find the project root owning `path`.
///
/// A root owns a path only when the path continues below it; the root
/// directory itself is not owned by anything.
pub fn project_root_for<'a, I>(path: &Path, roots: I) -> Option<&'a Path>
where
    I: IntoIterator<Item = &'a Path>,
{
    roots.into_iter().find(|root| {
        path.strip_prefix(root)
            .is_ok_and(|rest| rest.components().next().is_some())
    })
}

/// Name of the vendored package containing `path`, if any.
///
/// `path` must lie inside `root`. The package name is the segment directly
/// after `<root>/<modules_dir>/`.
pub fn package_name(path: &Path, root: &Path, modules_dir: &str) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments = relative.components().filter_map(|c| match c {
        Component::Normal(name) => Some(name),
        _ => None,
    });

    if segments.next()? != OsStr::new(modules_dir) {
        return None;
    }
    segments.next().map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn roots() -> Vec<PathBuf> {
        vec![PathBuf::from("/ws/proj"), PathBuf::from("/ws/warehouse")]
    }

    #[test]
    fn test_root_for_file_inside_project() {
        let roots = roots();
        let found = project_root_for(
            Path::new("/ws/proj/models/a.sql"),
            roots.iter().map(PathBuf::as_path),
        );
        assert_eq!(found, Some(Path::new("/ws/proj")));
    }

    #[test]
    fn test_root_for_unowned_file() {
        let roots = roots();
        let found = project_root_for(Path::new("/ws/other/x"), roots.iter().map(PathBuf::as_path));
        assert_eq!(found, None);
    }

    #[test]
    fn test_root_itself_is_not_owned() {
        let roots = roots();
        let found = project_root_for(Path::new("/ws/proj"), roots.iter().map(PathBuf::as_path));
        assert_eq!(found, None);
    }

    #[test]
    fn test_sibling_with_shared_prefix_is_not_owned() {
        let roots = roots();
        let found = project_root_for(
            Path::new("/ws/project/models/a.sql"),
            roots.iter().map(PathBuf::as_path),
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_package_name_inside_vendored_package() {
        let name = package_name(
            Path::new("/ws/proj/dbt_modules/pkgA/models/b.sql"),
            Path::new("/ws/proj"),
            "dbt_modules",
        );
        assert_eq!(name.as_deref(), Some("pkgA"));
    }

    #[test]
    fn test_package_name_modules_dir_alone() {
        let name = package_name(
            Path::new("/ws/proj/dbt_modules"),
            Path::new("/ws/proj"),
            "dbt_modules",
        );
        assert_eq!(name, None);
    }

    #[test]
    fn test_package_name_outside_modules_dir() {
        let name = package_name(
            Path::new("/ws/proj/models/dbt_modules/x.sql"),
            Path::new("/ws/proj"),
            "dbt_modules",
        );
        assert_eq!(name, None);
    }
}

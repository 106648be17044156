//! Public asset mounts.
//!
//! Every image, logo and background reference resolves through a recognized
//! public prefix (`/static/`, `/assets/`) onto a filesystem root. References
//! outside those prefixes, or escaping a root with `..`, do not resolve.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    /// URL prefix with leading and trailing slash, e.g. `/static/`
    pub url_prefix: String,
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct AssetMounts {
    mounts: Vec<Mount>,
}

impl AssetMounts {
    pub fn new(mounts: Vec<Mount>) -> Self {
        let mounts = mounts
            .into_iter()
            .map(|m| Mount {
                url_prefix: normalize_prefix(&m.url_prefix),
                root: m.root,
            })
            .collect();
        Self { mounts }
    }

    /// `/static/` → `static_root`, `/assets/` → `assets_root`
    pub fn standard(static_root: impl Into<PathBuf>, assets_root: impl Into<PathBuf>) -> Self {
        Self::new(vec![
            Mount { url_prefix: "/static/".into(), root: static_root.into() },
            Mount { url_prefix: "/assets/".into(), root: assets_root.into() },
        ])
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.mounts.iter().map(|m| m.url_prefix.clone()).collect()
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Map a public URL to a file under its mount root. Prefixes match
    /// case-insensitively.
    pub fn resolve(&self, url: &str) -> Option<PathBuf> {
        let url = url.trim();
        let mount = self.mounts.iter().find(|m| {
            url.get(..m.url_prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(&m.url_prefix))
        })?;
        let rel = Path::new(&url[mount.url_prefix.len()..]);
        if rel.as_os_str().is_empty() {
            return None;
        }
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(mount.root.join(rel))
    }

    /// Map a filesystem path back to its public URL. `None` if the path lies
    /// outside every mount root.
    pub fn public_url(&self, path: &Path) -> Option<String> {
        for mount in &self.mounts {
            if let Some(rel) = relative_to(path, &mount.root) {
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                return Some(format!("{}{}", mount.url_prefix, rel));
            }
        }
        None
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    if let (Ok(p), Ok(r)) = (path.canonicalize(), root.canonicalize()) {
        return p.strip_prefix(&r).ok().map(Path::to_path_buf);
    }
    let rel = path.strip_prefix(root).ok()?;
    if rel.components().all(|c| matches!(c, Component::Normal(_))) {
        Some(rel.to_path_buf())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_under_mount() {
        let mounts = AssetMounts::standard("/srv/static", "/srv/assets");
        assert_eq!(
            mounts.resolve("/static/uploads/logo.png"),
            Some(PathBuf::from("/srv/static/uploads/logo.png"))
        );
        assert_eq!(
            mounts.resolve("/assets/templates/a/thumb.png"),
            Some(PathBuf::from("/srv/assets/templates/a/thumb.png"))
        );
    }

    #[test]
    fn prefix_match_ignores_case() {
        let mounts = AssetMounts::standard("/srv/static", "/srv/assets");
        assert_eq!(
            mounts.resolve("/ASSETS/Logo.png"),
            Some(PathBuf::from("/srv/assets/Logo.png"))
        );
        assert_eq!(mounts.resolve("/Static/é.png"), Some(PathBuf::from("/srv/static/é.png")));
    }

    #[test]
    fn rejects_traversal_and_foreign_prefixes() {
        let mounts = AssetMounts::standard("/srv/static", "/srv/assets");
        assert_eq!(mounts.resolve("/static/../etc/passwd"), None);
        assert_eq!(mounts.resolve("/etc/passwd"), None);
        assert_eq!(mounts.resolve("https://cdn.example.com/a.png"), None);
        assert_eq!(mounts.resolve("/static/"), None);
    }

    #[test]
    fn public_url_fails_closed() {
        let mounts = AssetMounts::standard("/srv/static", "/srv/assets");
        assert_eq!(
            mounts.public_url(Path::new("/srv/static/generated/p.png")).as_deref(),
            Some("/static/generated/p.png")
        );
        assert_eq!(mounts.public_url(Path::new("/home/user/thumb.png")), None);
    }

    #[test]
    fn prefixes_are_normalized() {
        let mounts = AssetMounts::new(vec![Mount { url_prefix: "media".into(), root: "m".into() }]);
        assert_eq!(mounts.prefixes(), vec!["/media/".to_string()]);
    }
}

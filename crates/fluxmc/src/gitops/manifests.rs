//! Control-plane manifests compiled into the binary.

/// A file of the embedded manifest tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedFile {
    /// Path relative to the tree root, `/`-separated.
    pub path: &'static str,
    pub contents: &'static str,
}

impl EmbeddedFile {
    pub const fn new(path: &'static str, contents: &'static str) -> Self {
        Self { path, contents }
    }
}

/// Manifests pushed to the control-plane repository by `bootstrap`.
pub static CONTROL_PLANE_MANIFESTS: &[EmbeddedFile] = &[
    EmbeddedFile::new(
        "controller.yaml",
        include_str!("../../cp-manifests/controller.yaml"),
    ),
    EmbeddedFile::new(
        "crds/applications.yaml",
        include_str!("../../cp-manifests/crds/applications.yaml"),
    ),
    EmbeddedFile::new(
        "kustomization.yaml",
        include_str!("../../cp-manifests/kustomization.yaml"),
    ),
    EmbeddedFile::new(
        "namespace.yaml",
        include_str!("../../cp-manifests/namespace.yaml"),
    ),
];

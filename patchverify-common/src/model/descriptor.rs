use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::patch::{Edition, NO_RUNTIME_SUFFIX};
use crate::platform::InstallerKind;

/// Identity of one installable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallerDescriptor {
    product: String,
    edition: Edition,
    build_number: String,
    kind: InstallerKind,
    bundled_runtime: bool,
}

impl InstallerDescriptor {
    pub fn new(
        product: &str,
        edition: Edition,
        build_number: &str,
        kind: InstallerKind,
        bundled_runtime: bool,
    ) -> Self {
        Self {
            product: product.to_string(),
            edition,
            build_number: build_number.to_string(),
            kind,
            bundled_runtime,
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn edition(&self) -> &Edition {
        &self.edition
    }

    pub fn build_number(&self) -> &str {
        &self.build_number
    }

    pub fn kind(&self) -> InstallerKind {
        self.kind
    }

    pub fn bundled_runtime(&self) -> bool {
        self.bundled_runtime
    }

    /// `<product><edition>-<build>[-no-jdk].<ext>`
    pub fn file_name(&self) -> String {
        let runtime = if self.bundled_runtime {
            String::new()
        } else {
            format!("-{NO_RUNTIME_SUFFIX}")
        };
        format!(
            "{}{}-{}{}.{}",
            self.product,
            self.edition.code(),
            self.build_number,
            runtime,
            self.kind.extension()
        )
    }
}

impl fmt::Display for InstallerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

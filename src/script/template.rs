// Template lookup and rendering
//
// Templates live in a directory as `<name>-template.tmpl` files. Rendering
// copies the template to a fresh file in the work directory and fills the
// `{{main}}` placeholder with the compiled command text, then every
// `{{metadataKey}}` with task metadata. Unresolved placeholders stay as
// literal text so the device-interaction runtime can reject them visibly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::substitute_variables;
use crate::output::errors::ArmadaError;

/// Template used when neither the task nor the block names one
pub const DEFAULT_TEMPLATE: &str = "expect";

/// Resolve a template name to its file path
pub fn find(templates_dir: &Path, name: &str) -> Result<PathBuf, ArmadaError> {
    let name = if name.is_empty() { DEFAULT_TEMPLATE } else { name };
    let path = templates_dir.join(format!("{}-template.tmpl", name));

    if !path.is_file() {
        return Err(ArmadaError::Template {
            name: name.to_string(),
            path,
        });
    }
    Ok(path)
}

/// Render a template into a base script file in `work_dir`
pub fn render(
    template: &Path,
    main_section: &str,
    metadata: &HashMap<String, String>,
    work_dir: &Path,
) -> Result<PathBuf, ArmadaError> {
    let stamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let base = work_dir.join(format!("base-script-{}", stamp));

    std::fs::copy(template, &base).map_err(|e| ArmadaError::Io {
        message: format!("Failed to copy template: {}", e),
        path: Some(template.to_path_buf()),
    })?;
    make_executable(&base)?;

    // The main section goes in first; metadata values may themselves
    // contain braces and must not be re-scanned
    let mut main_var = HashMap::new();
    main_var.insert("main".to_string(), main_section.to_string());
    substitute_variables(&base, &main_var)?;
    substitute_variables(&base, metadata)?;

    debug!(script = %base.display(), "rendered base script");
    Ok(base)
}

pub(crate) fn make_executable(path: &Path) -> Result<(), ArmadaError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            ArmadaError::Io {
                message: format!("Failed to mark script executable: {}", e),
                path: Some(path.to_path_buf()),
            }
        })?;
    }
    Ok(())
}

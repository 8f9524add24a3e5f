//! Output destinations.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Where a job's workbook goes once its last page is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    /// Stage the workbook locally and return a relative download path.
    LocalDownload,
    /// Upload to a caller-chosen folder and filename.
    ExplicitRemote {
        site_url: String,
        folder: String,
        filename: String,
    },
    /// Upload to `<base_folder>/pdf_output/<template_stem>_pdf_<row_identifier>.xlsx`.
    /// Missing fields degrade to a local download.
    TemplatedRemote {
        site_url: String,
        #[serde(default)]
        base_folder: Option<String>,
        #[serde(default)]
        template_stem: Option<String>,
        #[serde(default)]
        row_identifier: Option<String>,
    },
    /// Results are kept until `finalize_batch` combines them.
    Batch,
}

/// A concrete remote target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub site_url: String,
    pub folder: String,
    pub filename: String,
}

/// Outcome of resolving a destination into something the router can write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Local,
    Remote(RemoteTarget),
    /// Templated metadata was incomplete; `reason` names what was missing.
    LocalFallback { reason: String },
}

/// Folder suffix appended to the templated base folder.
pub const TEMPLATED_SUBFOLDER: &str = "pdf_output";

impl Destination {
    pub fn is_batch(&self) -> bool {
        matches!(self, Destination::Batch)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Destination::LocalDownload => "local_download",
            Destination::ExplicitRemote { .. } => "explicit_remote",
            Destination::TemplatedRemote { .. } => "templated_remote",
            Destination::Batch => "batch",
        }
    }

    /// Rejects blank required fields. Templated fields are optional by
    /// contract and are not checked here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let require = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                Err(ValidationError::BlankDestinationField { field })
            } else {
                Ok(())
            }
        };

        match self {
            Destination::LocalDownload | Destination::Batch => Ok(()),
            Destination::ExplicitRemote {
                site_url,
                folder,
                filename,
            } => {
                require("site_url", site_url)?;
                require("folder", folder)?;
                require("filename", filename)
            }
            Destination::TemplatedRemote { site_url, .. } => require("site_url", site_url),
        }
    }

    /// Turns the destination into a concrete target.
    pub fn resolve(&self) -> Result<Resolved, ValidationError> {
        match self {
            Destination::LocalDownload => Ok(Resolved::Local),
            Destination::Batch => Err(ValidationError::DeferredDestination),
            Destination::ExplicitRemote {
                site_url,
                folder,
                filename,
            } => Ok(Resolved::Remote(RemoteTarget {
                site_url: site_url.trim().to_string(),
                folder: folder.trim().trim_end_matches('/').to_string(),
                filename: filename.trim().to_string(),
            })),
            Destination::TemplatedRemote {
                site_url,
                base_folder,
                template_stem,
                row_identifier,
            } => {
                let fields = [
                    ("site_url", non_blank(Some(site_url.as_str()))),
                    ("base_folder", non_blank(base_folder.as_deref())),
                    ("template_stem", non_blank(template_stem.as_deref())),
                    ("row_identifier", non_blank(row_identifier.as_deref())),
                ];

                match fields {
                    [(_, Some(site_url)), (_, Some(base)), (_, Some(stem)), (_, Some(row))] => {
                        Ok(Resolved::Remote(RemoteTarget {
                            site_url: site_url.to_string(),
                            folder: format!(
                                "{}/{}",
                                base.trim_end_matches('/'),
                                TEMPLATED_SUBFOLDER
                            ),
                            filename: format!("{}_pdf_{}.xlsx", stem, row),
                        }))
                    }
                    _ => {
                        let missing: Vec<&str> = fields
                            .iter()
                            .filter(|(_, value)| value.is_none())
                            .map(|(name, _)| *name)
                            .collect();
                        Ok(Resolved::LocalFallback {
                            reason: format!(
                                "templated destination is missing {}",
                                missing.join(", ")
                            ),
                        })
                    }
                }
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

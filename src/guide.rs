use std::sync::Arc;

use crate::config::ShortcutDescriptor;
use crate::peer::PeerWriter;
use crate::shortcut::blob_upload::BlobUploadShortcut;
use crate::shortcut::null::NullShortcut;
use crate::shortcut::{Role, Shortcut};

/// Known shortcut kinds, matched case-insensitively against configured
/// shortcut names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShortcutKind {
    Null,
    BlobUpload,
}

fn kind_for_name(name: &str) -> Option<ShortcutKind> {
    if name.eq_ignore_ascii_case("shortcut_null") {
        Some(ShortcutKind::Null)
    } else if name.eq_ignore_ascii_case("shortcut_azure_blob") {
        Some(ShortcutKind::BlobUpload)
    } else {
        None
    }
}

/// A matched shortcut plan: the kind to construct plus the settings the
/// configuration attached to it.
#[derive(Debug, Clone)]
struct Plan {
    kind: ShortcutKind,
    exitno: i64,
    wormhole: bool,
}

fn finds_blob_upload(role: Role, signature: &str) -> bool {
    role == Role::Client
        && (signature.starts_with("AzCopy")
            || signature.starts_with("azcopy")
            || signature.ends_with("azure-storage-go/10.0.2 api-version/2016-05-31 blob"))
}

/// Resolves a shortcut for each newly observed `(role, client signature)`
/// pair. Plans are tried in configuration order; the first match wins.
/// Falls back to a null shortcut when nothing matches.
#[derive(Debug, Clone, Default)]
pub struct Guide {
    plans: Vec<Plan>,
}

impl Guide {
    pub fn new() -> Guide {
        Guide { plans: Vec::new() }
    }

    /// Registers the configured shortcut descriptors, skipping unknown
    /// names with a logged count. `shortcut_null` needs no plan: it has
    /// no finder, since it's already the unconditional fallback below.
    pub fn load_shortcuts(&mut self, descriptors: &[ShortcutDescriptor]) {
        let mut skipped = 0;
        for descriptor in descriptors {
            match kind_for_name(&descriptor.shortcut) {
                Some(ShortcutKind::Null) => {}
                Some(kind) => self.plans.push(Plan {
                    kind,
                    exitno: descriptor.exitno,
                    wormhole: descriptor.wormhole,
                }),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::warn!("ignored {skipped} unrecognized shortcut name(s) while loading itinerary");
        }
    }

    /// Finds and constructs a shortcut for a route given the observed
    /// role and client signature (e.g. a User-Agent string).
    pub fn find_shortcut(
        &self,
        route_number: u64,
        role: Role,
        signature: &str,
        client: Arc<PeerWriter>,
        server: Arc<PeerWriter>,
    ) -> Shortcut {
        for plan in &self.plans {
            let matched = match plan.kind {
                ShortcutKind::BlobUpload => finds_blob_upload(role, signature),
                ShortcutKind::Null => false,
            };
            if matched {
                return Shortcut::BlobUpload(BlobUploadShortcut::new(
                    route_number,
                    client,
                    server,
                    plan.exitno,
                    plan.wormhole,
                ));
            }
        }
        Shortcut::Null(NullShortcut::new(client, server))
    }
}

//! Member extraction from `.ipa` archives.
//!
//! An `.ipa` is a zip whose application lives under `Payload/<App>.app/`. The
//! top-level `Info.plist` sits three segments deep; frameworks and plugins
//! bundled inside the payload carry their own `Info.plist` files further down,
//! so the segment count is what tells them apart.

mod scratch;

pub use scratch::ScratchDir;

use crate::error::{PipelineError, Result};
use std::io;
use std::path::{Path, PathBuf};

/// Name of the application manifest inside the bundle.
pub const INFO_PLIST: &str = "Info.plist";

/// Members at this depth or deeper belong to nested bundles.
const NESTED_DEPTH: usize = 4;

/// True when `member` names `target` at the top level of the payload.
pub fn is_top_level_member(member: &str, target: &str) -> bool {
    let segments: Vec<&str> = member.split('/').collect();
    segments.last() == Some(&target) && segments.len() < NESTED_DEPTH
}

/// Extract the first top-level member named `target` into `scratch`.
///
/// Returns the path of the extracted file. Fails with
/// [`PipelineError::Extraction`] if the archive cannot be opened or holds no
/// qualifying member.
pub async fn extract_member(
    archive_path: &Path,
    target: &str,
    scratch: &ScratchDir,
) -> Result<PathBuf> {
    log::info!("Extracting {} from {}", target, archive_path.display());

    let archive = archive_path.to_path_buf();
    let target_name = target.to_string();
    let destination = scratch.path().join(target);

    // zip::ZipArchive is synchronous; keep it off the async workers
    let found = tokio::task::spawn_blocking(move || {
        extract_blocking(&archive, &target_name, &destination)
            .map(|found| found.then_some(destination))
    })
    .await
    .map_err(|e| PipelineError::Extraction {
        archive: archive_path.to_path_buf(),
        reason: format!("extraction task panicked: {}", e),
    })?
    .map_err(|reason| PipelineError::Extraction {
        archive: archive_path.to_path_buf(),
        reason,
    })?;

    found.ok_or_else(|| PipelineError::Extraction {
        archive: archive_path.to_path_buf(),
        reason: format!("no top-level {} in archive", target),
    })
}

fn extract_blocking(
    archive_path: &Path,
    target: &str,
    destination: &Path,
) -> std::result::Result<bool, String> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| format!("cannot open archive: {}", e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("cannot read archive: {}", e))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| format!("cannot read member #{}: {}", index, e))?;

        if !is_top_level_member(entry.name(), target) {
            continue;
        }

        log::debug!("Selected member {}", entry.name());
        let mut out = std::fs::File::create(destination)
            .map_err(|e| format!("cannot create {}: {}", destination.display(), e))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| format!("cannot write {}: {}", destination.display(), e))?;
        return Ok(true);
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_ipa(path: &Path, members: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn top_level_member_requires_fewer_than_four_segments() {
        assert!(is_top_level_member("Payload/App.app/Info.plist", INFO_PLIST));
        assert!(is_top_level_member("Info.plist", INFO_PLIST));
        assert!(!is_top_level_member(
            "Payload/App.app/Frameworks/Info.plist",
            INFO_PLIST
        ));
        assert!(!is_top_level_member("Payload/App.app/Info.plist.bak", INFO_PLIST));
        assert!(!is_top_level_member("Payload/App.app/", INFO_PLIST));
    }

    #[tokio::test]
    async fn extracts_top_level_plist_and_skips_nested_copies() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("App.ipa");
        write_ipa(
            &ipa,
            &[
                ("Payload/App.app/Frameworks/Kit.framework/Info.plist", b"nested"),
                ("Payload/App.app/Info.plist", b"top"),
            ],
        );

        let scratch = ScratchDir::create(tmp.path()).await.unwrap();
        let extracted = extract_member(&ipa, INFO_PLIST, &scratch).await.unwrap();

        assert_eq!(std::fs::read(&extracted).unwrap(), b"top");
        assert!(extracted.starts_with(scratch.path()));
    }

    #[tokio::test]
    async fn missing_member_is_an_extraction_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("App.ipa");
        write_ipa(&ipa, &[("Payload/App.app/App", b"binary")]);

        let scratch = ScratchDir::create(tmp.path()).await.unwrap();
        let err = extract_member(&ipa, INFO_PLIST, &scratch)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction { .. }));
    }

    #[tokio::test]
    async fn unreadable_archive_is_an_extraction_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("App.ipa");
        std::fs::write(&ipa, b"not a zip").unwrap();

        let scratch = ScratchDir::create(tmp.path()).await.unwrap();
        let err = extract_member(&ipa, INFO_PLIST, &scratch)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read archive"));
    }
}

//! Boot-time GeoLite2-Country database downloader.
//!
//! Grounded on `GeoIPSingleton._download_mmdb`: fetches the MaxMind tarball,
//! extracts the single `.mmdb` member, and moves it into place. Runs once
//! before `GeoIpService` first attempts to load, and only when the target
//! file is missing and a license key is configured — it never blocks
//! capture startup on failure.

use crate::error::AppError;
use std::io::Read;
use std::path::Path;

const DOWNLOAD_URL: &str = "https://download.maxmind.com/app/geoip_download";

/// Downloads and extracts the GeoLite2-Country database to `db_path` if it
/// does not already exist. A missing license key or any download/extract
/// failure is logged and treated as "try loading anyway, degrade to
/// Unknown if that also fails" — never a fatal boot error.
pub fn ensure_geoip_database(db_path: &str, license_key: Option<&str>) {
    let path = Path::new(db_path);
    if path.exists() {
        return;
    }
    let Some(license_key) = license_key else {
        tracing::warn!("GEOIP_DB_ABSOLUTE_PATH missing and MAXMIND_LICENSE_KEY not set, skipping download");
        return;
    };
    match download_and_extract(db_path, license_key) {
        Ok(()) => tracing::info!("GeoLite2-Country database downloaded to {db_path}"),
        Err(e) => tracing::warn!("failed to download GeoLite2-Country database: {e}"),
    }
}

fn download_and_extract(db_path: &str, license_key: &str) -> Result<(), AppError> {
    if let Some(dir) = Path::new(db_path).parent() {
        std::fs::create_dir_all(dir)?;
    }

    let response = reqwest::blocking::Client::new()
        .get(DOWNLOAD_URL)
        .query(&[("edition_id", "GeoLite2-Country"), ("license_key", license_key), ("suffix", "tar.gz")])
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .map_err(|e| AppError::Io(e.to_string()))?
        .error_for_status()
        .map_err(|e| AppError::Io(e.to_string()))?;

    let bytes = response.bytes().map_err(|e| AppError::Io(e.to_string()))?;
    extract_mmdb(&bytes, db_path)
}

fn extract_mmdb(tar_gz_bytes: &[u8], db_path: &str) -> Result<(), AppError> {
    let decoder = flate2::read::GzDecoder::new(tar_gz_bytes);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_path_buf();
        if entry_path.extension().and_then(|e| e.to_str()) == Some("mmdb") {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            std::fs::write(db_path, contents)?;
            return Ok(());
        }
    }
    Err(AppError::Io("no .mmdb member found in downloaded archive".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_download_when_file_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.mmdb");
        std::fs::write(&path, b"placeholder").unwrap();
        ensure_geoip_database(path.to_str().unwrap(), Some("fake-key"));
        assert_eq!(std::fs::read(&path).unwrap(), b"placeholder");
    }

    #[test]
    fn test_skips_download_without_license_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.mmdb");
        ensure_geoip_database(path.to_str().unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_extract_mmdb_rejects_archive_without_mmdb_member() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"not an mmdb file";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, "readme.txt", &data[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        use std::io::Write;
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mmdb");
        let result = extract_mmdb(&gz_bytes, target.to_str().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_mmdb_writes_matching_member() {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"fake mmdb contents";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, "GeoLite2-Country_20240101/GeoLite2-Country.mmdb", &data[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        use std::io::Write;
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mmdb");
        extract_mmdb(&gz_bytes, target.to_str().unwrap()).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), data);
    }
}

//! Common test utilities for gtfsval integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A small feed that passes every built-in rule.
pub const VALID_FEED: &[(&str, &str)] = &[
    (
        "agency.txt",
        "agency_id,agency_name,agency_url,agency_timezone\nA1,Metro,https://example.com,America/Montreal\n",
    ),
    (
        "stops.txt",
        "stop_id,stop_name,stop_lat,stop_lon\nS1,First,45.50,-73.56\nS2,Second,45.51,-73.57\nS3,Third,45.52,-73.58\n",
    ),
    (
        "routes.txt",
        "route_id,agency_id,route_short_name,route_long_name,route_type\nR1,A1,1,Downtown,3\n",
    ),
    ("trips.txt", "route_id,service_id,trip_id\nR1,WK,T1\nR1,WK,T2\n"),
    (
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
         T1,08:00:00,08:00:00,S1,1\n\
         T1,08:05:00,08:06:00,S2,2\n\
         T1,08:10:00,08:10:00,S3,3\n\
         T2,09:00:00,09:00:00,S1,1\n\
         T2,09:05:00,09:05:00,S2,2\n\
         T2,09:10:00,09:10:00,S3,3\n",
    ),
    (
        "calendar.txt",
        "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
         WK,1,1,1,1,1,0,0,20240101,20991231\n",
    ),
];

/// `VALID_FEED` with one table replaced, or removed when `content` is `None`.
pub fn feed_replacing<'a>(name: &'a str, content: Option<&'a str>) -> Vec<(&'a str, &'a str)> {
    let mut files: Vec<(&str, &str)> = VALID_FEED
        .iter()
        .copied()
        .filter(|(file, _)| *file != name)
        .collect();
    if let Some(content) = content {
        files.push((name, content));
    }
    files
}

/// Write the files into a fresh temporary directory.
///
/// # Panics
///
/// Panics if the directory or a file cannot be created.
pub fn feed_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    for (name, content) in files {
        std::fs::write(dir.path().join(name), content).expect("Failed to write feed file");
    }
    dir
}

/// Write the files into `dir/feed.zip`, optionally under a folder prefix
/// such as `"gtfs/"`.
///
/// # Panics
///
/// Panics if the archive cannot be written.
pub fn feed_zip(dir: &Path, files: &[(&str, &str)], prefix: &str) -> PathBuf {
    let path = dir.join("feed.zip");
    let file = File::create(&path).expect("Failed to create archive");
    let mut zip = ZipWriter::new(file);
    for (name, content) in files {
        zip.start_file(format!("{prefix}{name}"), SimpleFileOptions::default())
            .expect("Failed to start archive entry");
        zip.write_all(content.as_bytes())
            .expect("Failed to write archive entry");
    }
    zip.finish().expect("Failed to finish archive");
    path
}

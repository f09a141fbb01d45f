//! In-memory upstream shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use data_sources::{Fetcher, Probe};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use test_utils::{concat_messages, Grib2Builder};
use tile_common::{TileError, TileResult};

/// Serves listings and payloads from maps and records every payload fetch.
///
/// A payload published as a sequence serves its versions in order; the last
/// one repeats forever.
#[derive(Default)]
pub struct FakeFetcher {
    texts: Mutex<HashMap<String, String>>,
    files: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    downloads: Mutex<Vec<String>>,
    probes: Mutex<usize>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&self, url: &str, body: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn publish(&self, url: &str, bytes: Vec<u8>) {
        self.publish_sequence(url, vec![bytes]);
    }

    pub fn publish_sequence(&self, url: &str, versions: Vec<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), versions.into());
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }

    pub fn probe_count(&self) -> usize {
        *self.probes.lock().unwrap()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn get_text(&self, url: &str) -> TileResult<String> {
        self.texts
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TileError::Network(format!("{}: 404 Not Found", url)))
    }

    async fn probe(&self, url: &str) -> TileResult<Probe> {
        *self.probes.lock().unwrap() += 1;
        Ok(match self.files.lock().unwrap().get(url).and_then(|v| v.front()) {
            Some(bytes) => Probe::Present {
                size: Some(bytes.len() as u64),
            },
            None => Probe::Missing,
        })
    }

    async fn download_to(&self, url: &str, dest: &Path) -> TileResult<u64> {
        let bytes = {
            let mut files = self.files.lock().unwrap();
            let versions = files
                .get_mut(url)
                .ok_or_else(|| TileError::Network(format!("{}: 404 Not Found", url)))?;
            if versions.len() > 1 {
                versions.pop_front().unwrap_or_default()
            } else {
                versions.front().cloned().unwrap_or_default()
            }
        };
        self.downloads.lock().unwrap().push(url.to_string());

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

/// A GFS payload holding every variable the GFS source extracts, with CAPE
/// set to `cape`.
pub fn gfs_payload(cape: f32) -> Vec<u8> {
    concat_messages(&[
        Grib2Builder::new_gfs()
            .with_parameter(7, 6)
            .with_constant_value(cape)
            .build(),
        Grib2Builder::new_gfs()
            .with_parameter(2, 2)
            .with_surface(100, 100_000)
            .with_constant_value(6.0)
            .build(),
        Grib2Builder::new_gfs()
            .with_parameter(2, 3)
            .with_surface(100, 100_000)
            .with_constant_value(-8.0)
            .build(),
        Grib2Builder::new_gfs()
            .with_parameter(0, 0)
            .with_constant_value(288.15)
            .build(),
        Grib2Builder::new_gfs()
            .with_parameter(2, 10)
            .with_surface(100, 50_000)
            .with_constant_value(1.5e-4)
            .build(),
    ])
}

pub fn hrrr_payload(cape: f32) -> Vec<u8> {
    Grib2Builder::new_hrrr().with_constant_value(cape).build()
}

/// Bytes that start like GRIB2 but end early.
pub fn corrupt_payload() -> Vec<u8> {
    let mut bytes = gfs_payload(0.0);
    bytes.truncate(60);
    bytes
}

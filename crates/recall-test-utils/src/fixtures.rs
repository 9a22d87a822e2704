// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory model archives shaped like the published artifacts.
//!
//! Builders panic on failure; they only run inside tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;

/// Files of a minimal weights tree.
pub const WEIGHT_FILES: &[(&str, &[u8])] = &[
    ("model-config.json", b"{\"context_window_size\": 2048}"),
    ("weights-index.json", b"{\"records\": []}"),
    ("params_shard_0.bin", b"\x00\x01\x02\x03"),
    ("tokenizer.json", b"{}"),
];

/// A weights zip. With `root`, every entry sits under that single directory.
pub fn weights_zip(root: Option<&str>) -> Vec<u8> {
    let files: Vec<(String, &[u8])> = WEIGHT_FILES
        .iter()
        .map(|(name, data)| match root {
            Some(dir) => (format!("{dir}/{name}"), *data),
            None => (name.to_string(), *data),
        })
        .collect();
    zip_bytes(&files)
}

/// A zip holding exactly `files`.
pub fn zip_bytes<S: AsRef<str>>(files: &[(S, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in files {
        zip.start_file(name.as_ref(), options).expect("zip entry");
        zip.write_all(data).expect("zip write");
    }
    zip.finish().expect("zip finish").into_inner()
}

/// A gzip-compressed tar of a runtime library.
pub fn library_tar_gz(model_lib: &str) -> Vec<u8> {
    let lib = format!("{model_lib}.so");
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in [(lib.as_str(), b"\x7fELF".as_slice()), ("manifest.json", b"{}")] {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).expect("tar entry");
    }
    let tar = builder.into_inner().expect("tar finish");

    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(&tar).expect("gzip write");
    gz.finish().expect("gzip finish")
}

/// Lay out a complete model root at `root` without any download.
pub fn install_model(root: &std::path::Path, model_id: &str) {
    std::fs::create_dir_all(root).expect("model root");
    for (name, data) in WEIGHT_FILES {
        std::fs::write(root.join(name), data).expect("weight file");
    }
    std::fs::write(root.join(recall_models::store::LIBRARY_MARKER), model_id).expect("marker");
}

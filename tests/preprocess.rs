use std::fs;

use agarqc::imaging::{crop, enumerate_batch, parse_timestamp, Timestamp};
use tempfile::TempDir;

#[test]
fn timestamp_from_filename() {
    let ts = parse_timestamp("plate_202108231240.tif").unwrap();
    assert_eq!(
        ts,
        Timestamp {
            year: 2021,
            month: 8,
            day: 23,
            hour: 12,
            minute: 40
        }
    );
    assert_eq!(ts.compact(), "202108231240");
}

#[test]
fn timestamp_needs_exactly_twelve_digits() {
    assert!(parse_timestamp("plate_2021082312.tif").is_err());
    assert!(parse_timestamp("plate_2021082312405.tif").is_err());
    assert!(parse_timestamp("no_digits_here.tif").is_err());
    // A shorter run earlier in the name does not mask a later 12-digit run.
    assert!(parse_timestamp("cam2_202108231240.tif").is_ok());
}

#[test]
fn hours_between_timestamps() {
    let start = parse_timestamp("202108231200").unwrap();
    let end = parse_timestamp("202108241330").unwrap();
    assert!((end.hours_since(&start).unwrap() - 25.5).abs() < 1e-9);
}

#[test]
fn invalid_calendar_date_errors() {
    let start = parse_timestamp("202102301200").unwrap(); // Feb 30
    let end = parse_timestamp("202103011200").unwrap();
    assert!(end.hours_since(&start).is_err());
}

#[test]
fn quadrant_boxes_tile_the_image() {
    let (w, h) = (101u32, 75u32);
    let boxes: Vec<_> = (1..=4)
        .map(|p| crop::quadrant_box(p, w, h).unwrap())
        .collect();
    assert_eq!(boxes[0], (0, 0, 50, 37));
    assert_eq!(boxes[1], (50, 0, 51, 37));
    assert_eq!(boxes[2], (0, 37, 50, 38));
    assert_eq!(boxes[3], (50, 37, 51, 38));
    let area: u64 = boxes.iter().map(|(_, _, bw, bh)| *bw as u64 * *bh as u64).sum();
    assert_eq!(area, w as u64 * h as u64);
    assert!(crop::quadrant_box(5, w, h).is_err());
}

#[test]
fn crop_and_preview_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("batch.png");
    image::RgbImage::new(120, 80).save(&source).unwrap();

    let dest = tmp.path().join("plate2.png");
    crop::crop_plate(&source, 2, &dest).unwrap();
    assert_eq!(crop::dimensions(&dest).unwrap(), (60, 40));

    let preview = tmp.path().join("preview.png");
    let factor = crop::write_preview(&source, &preview, 30).unwrap();
    assert!((factor - 0.25).abs() < 1e-9);
    assert_eq!(crop::dimensions(&preview).unwrap(), (30, 20));
}

#[test]
fn batch_enumeration_orders_and_barcodes() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    // Written out of order; names carry the acquisition timestamp.
    image::RgbImage::new(4, 4)
        .save(dir.join("shot_202108231400.png"))
        .unwrap();
    image::RgbImage::new(4, 4)
        .save(dir.join("shot_202108231200.png"))
        .unwrap();
    fs::write(dir.join(".hidden_202108231100.png"), "x").unwrap();
    fs::write(dir.join("notes_202108231100.txt"), "x").unwrap();

    let images = enumerate_batch("SC1", dir).unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].barcode, "img_0000_202108231200");
    assert_eq!(images[1].barcode, "img_0001_202108231400");
}

#[test]
fn empty_batch_errors() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("notes.txt"), "x").unwrap();
    let err = enumerate_batch("SC1", tmp.path()).unwrap_err().to_string();
    assert!(err.contains("no usable images"), "{}", err);
}

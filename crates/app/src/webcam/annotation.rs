//! Drawing recognition results onto frames.

use anyhow::Result;
use image::{Rgb, RgbImage};
use recognition::Detection;
use video_ingest::Frame;

use crate::webcam::{
    encoding::{encode_jpeg, frame_to_rgb},
    state::RecognitionSnapshot,
};

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const GLYPH_SCALE: i32 = 2;
const GLYPH_ADVANCE: i32 = 6 * GLYPH_SCALE;
const GLYPH_HEIGHT: i32 = 7 * GLYPH_SCALE;
const UNKNOWN_LABEL: &str = "Unknown";

/// Text shown above a detection: best candidate with two decimals, or
/// `Unknown` when the service offered no candidate.
pub(crate) fn label_for(detection: &Detection) -> String {
    match detection.best_candidate() {
        Some(best) => format!("{} ({:.2})", best.subject, best.similarity),
        None => UNKNOWN_LABEL.to_string(),
    }
}

/// Draw every cached detection onto a copy of `frame`.
pub(crate) fn annotate_frame(frame: &Frame, snapshot: &RecognitionSnapshot) -> Result<RgbImage> {
    let mut image = frame_to_rgb(frame)?;
    if image.width() == 0 || image.height() == 0 {
        return Ok(image);
    }

    for detection in &snapshot.detections {
        let color = if detection.candidates.is_empty() {
            UNKNOWN_COLOR
        } else {
            KNOWN_COLOR
        };
        let bbox = detection.bbox;
        draw_rectangle(
            &mut image,
            bbox.x_min,
            bbox.y_min,
            bbox.x_max,
            bbox.y_max,
            color,
        );

        let label = label_for(detection);
        let label_x = bbox.x_min.max(0);
        let label_y = (bbox.y_min - GLYPH_HEIGHT - 6).max(0);
        let text_width = label.chars().count() as i32 * GLYPH_ADVANCE;
        fill_rect(
            &mut image,
            label_x,
            label_y,
            label_x + text_width + 2,
            label_y + GLYPH_HEIGHT + 2,
            LABEL_BACKGROUND,
        );
        draw_label(&mut image, label_x + 2, label_y + 2, &label, color);
    }

    Ok(image)
}

pub(crate) fn annotate_and_encode(
    frame: &Frame,
    snapshot: &RecognitionSnapshot,
    quality: u8,
) -> Result<Vec<u8>> {
    encode_jpeg(&annotate_frame(frame, snapshot)?, quality)
}

fn draw_rectangle(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    let (left, right) = (left.min(right), left.max(right));
    let (top, bottom) = (top.min(bottom), top.max(bottom));
    for inset in 0..BOX_THICKNESS {
        let (l, t, r, b) = (left + inset, top + inset, right - inset, bottom - inset);
        if l > r || t > b {
            break;
        }
        fill_rect(image, l, t, r, t, color);
        fill_rect(image, l, b, r, b, color);
        fill_rect(image, l, t, l, b, color);
        fill_rect(image, r, t, r, b, color);
    }
}

/// Fill the inclusive rectangle, skipping whatever lies outside the image.
fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if right < 0 || bottom < 0 || left >= width || top >= height {
        return;
    }
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(width - 1);
    let bottom = bottom.min(height - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()).map(fold_accent) {
        if ch != ' ' {
            let glyph = glyph_bits(ch).unwrap_or(QUESTION);
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col * GLYPH_SCALE;
                        let py = y + row as i32 * GLYPH_SCALE;
                        fill_rect(
                            image,
                            px,
                            py,
                            px + GLYPH_SCALE - 1,
                            py + GLYPH_SCALE - 1,
                            color,
                        );
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn fold_accent(ch: char) -> char {
    match ch {
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ñ' => 'N',
        'Ç' => 'C',
        other => other,
    }
}

const QUESTION: [u8; 7] = [
    0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b00000, 0b00100,
];

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let glyph = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '?' => QUESTION,
        _ => return None,
    };
    Some(glyph)
}

#[cfg(test)]
mod tests {
    use recognition::BoundingBox;

    use super::*;
    use crate::webcam::testing::{blank_frame, detection};

    fn snapshot_with(detections: Vec<Detection>) -> RecognitionSnapshot {
        RecognitionSnapshot::new(detections)
    }

    fn boxed(mut detection: Detection, x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Detection {
        detection.bbox = BoundingBox {
            x_min,
            y_min,
            x_max,
            y_max,
        };
        detection
    }

    #[test]
    fn label_uses_first_best_candidate() {
        let d = detection(&[("A", 0.4), ("B", 0.9), ("C", 0.9)]);
        assert_eq!(label_for(&d), "B (0.90)");
    }

    #[test]
    fn label_without_candidates_is_unknown() {
        assert_eq!(label_for(&detection(&[])), "Unknown");
    }

    #[test]
    fn draws_known_and_unknown_boxes() {
        let frame = blank_frame(64, 64);
        let snapshot = snapshot_with(vec![
            boxed(detection(&[("ana", 0.8)]), 30, 30, 40, 40),
            boxed(detection(&[]), 45, 45, 60, 60),
        ]);
        let image = annotate_frame(&frame, &snapshot).unwrap();
        assert_eq!(image.get_pixel(30, 35), &KNOWN_COLOR);
        assert_eq!(image.get_pixel(60, 50), &UNKNOWN_COLOR);
        assert_eq!(image.get_pixel(35, 35), &Rgb([0, 0, 0]), "box interior untouched");
    }

    #[test]
    fn empty_snapshot_leaves_frame_unchanged() {
        let frame = blank_frame(8, 8);
        let image = annotate_frame(&frame, &snapshot_with(Vec::new())).unwrap();
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn boxes_outside_the_frame_are_clipped() {
        let frame = blank_frame(16, 16);
        let snapshot = snapshot_with(vec![
            boxed(detection(&[("ñandú", 1.0)]), -20, -20, 200, 200),
            boxed(detection(&[]), 100, 100, 120, 120),
        ]);
        let image = annotate_frame(&frame, &snapshot).unwrap();
        assert_eq!((image.width(), image.height()), (16, 16));
    }

    #[test]
    fn annotated_frame_encodes() {
        let frame = blank_frame(32, 24);
        let snapshot = snapshot_with(vec![boxed(detection(&[("ana", 0.5)]), 4, 4, 20, 20)]);
        let jpeg = annotate_and_encode(&frame, &snapshot, 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}

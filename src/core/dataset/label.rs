use std::fs;
use std::path::Path;

/// One object: `class_id x_center y_center width height`, normalized
#[derive(Debug, Clone, PartialEq)]
pub struct YoloDetection {
    pub class_id: u32,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

impl YoloDetection {
    /// Center inside the image and a positive box no larger than it
    pub fn is_normalized(&self) -> bool {
        let unit = 0.0..=1.0;
        unit.contains(&self.x_center)
            && unit.contains(&self.y_center)
            && self.width > 0.0
            && self.width <= 1.0
            && self.height > 0.0
            && self.height <= 1.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelInfo {
    pub detections: Vec<YoloDetection>,
    /// Non-empty lines that were neither comments nor valid, normalized detections
    pub malformed_lines: usize,
}

/// Parse a YOLO format annotation file.
///
/// # Returns
/// * `Some(LabelInfo)` if the file could be read
/// * `None` if the file doesn't exist or cannot be read
pub fn parse_label_file(label_path: &Path) -> Option<LabelInfo> {
    let content = fs::read_to_string(label_path).ok()?;
    Some(parse_label_str(&content))
}

fn parse_label_str(content: &str) -> LabelInfo {
    let mut info = LabelInfo::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let values: Vec<&str> = line.split_whitespace().collect();
        let parsed = match values.as_slice() {
            [class_id, x, y, w, h] => match (
                class_id.parse::<u32>(),
                x.parse::<f32>(),
                y.parse::<f32>(),
                w.parse::<f32>(),
                h.parse::<f32>(),
            ) {
                (Ok(class_id), Ok(x), Ok(y), Ok(w), Ok(h)) => Some(YoloDetection {
                    class_id,
                    x_center: x,
                    y_center: y,
                    width: w,
                    height: h,
                }),
                _ => None,
            },
            _ => None,
        };

        match parsed {
            Some(detection) if detection.is_normalized() => info.detections.push(detection),
            _ => info.malformed_lines += 1,
        }
    }

    info
}

//! Tags each detection of a frame against the current zone set.

use crate::frame::{Detection, Frame, FrameSummary};
use crate::geometry::bounding_box_collides_any_zone;
use crate::zones::Zone;

/// A frame whose `collides` flags have been computed, plus its counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedFrame {
    pub frame: Frame,
    pub summary: FrameSummary,
}

/// Sets every detection's `collides` flag and counts the result.
///
/// Any incoming `collides` value is overwritten. Detections without a box
/// are counted and never collide.
pub fn resolve_frame(mut frame: Frame, zones: &[Zone]) -> ResolvedFrame {
    for detection in &mut frame.detections {
        detection.collides = match &detection.bbox {
            Some(bbox) => bounding_box_collides_any_zone(bbox, zones),
            None => false,
        };
    }
    let summary = frame.summary();
    ResolvedFrame { frame, summary }
}

/// Counts collisions of a detection slice without keeping the frame.
pub fn count_collisions<'a, I>(detections: I, zones: &[Zone]) -> u32
where
    I: IntoIterator<Item = &'a Detection>,
{
    detections
        .into_iter()
        .filter(|d| {
            d.bbox
                .as_ref()
                .is_some_and(|bbox| bounding_box_collides_any_zone(bbox, zones))
        })
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BoundingBox;
    use crate::geometry::Point;

    fn left_half() -> Zone {
        Zone::new(
            "left",
            vec![
                Point::new(0.0, 0.0),
                Point::new(0.5, 0.0),
                Point::new(0.5, 1.0),
                Point::new(0.0, 1.0),
            ],
            10.0,
        )
    }

    #[test]
    fn flags_and_counts_detections() {
        let mut stale = Detection::new(BoundingBox::new(0.7, 0.7, 0.8, 0.8), "person", 1);
        stale.collides = true;
        let frame = Frame::new(vec![
            Detection::new(BoundingBox::new(0.1, 0.1, 0.2, 0.2), "person", 1),
            stale,
            Detection {
                bbox: None,
                label: "person".to_string(),
                timestamp: 1,
                confidence: None,
                collides: true,
            },
        ]);

        let resolved = resolve_frame(frame, &[left_half()]);
        let flags: Vec<bool> = resolved.frame.detections.iter().map(|d| d.collides).collect();
        assert_eq!(flags, vec![true, false, false]);
        assert_eq!(resolved.summary, FrameSummary::new(3, 1));
    }

    #[test]
    fn no_zones_means_no_collisions() {
        let frame = Frame::new(vec![Detection::new(
            BoundingBox::new(0.1, 0.1, 0.2, 0.2),
            "person",
            1,
        )]);
        assert_eq!(resolve_frame(frame, &[]).summary, FrameSummary::new(1, 0));
    }

    #[test]
    fn count_collisions_matches_resolver() {
        let detections = vec![
            Detection::new(BoundingBox::new(0.1, 0.1, 0.2, 0.2), "person", 1),
            Detection::new(BoundingBox::new(0.3, 0.3, 0.4, 0.4), "person", 1),
            Detection::new(BoundingBox::new(0.8, 0.8, 0.9, 0.9), "person", 1),
        ];
        assert_eq!(count_collisions(&detections, &[left_half()]), 2);
    }
}

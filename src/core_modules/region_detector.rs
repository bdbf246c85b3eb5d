// THEORY:
// The `region_detector` is the spatial grouping step of the analyzer. It turns the
// binary `Mask` into the list of exterior regions of "on" pixels and their
// bounding rectangles, i.e. the same set an external-only contour trace yields.
//
// Algorithm:
// 1.  **Outside Fill**: Flood the "off" pixels reachable from the frame border,
//     using 4-connectivity. Whatever "off" pixels remain unreached are holes.
// 2.  **Region Growing**: Scan the mask in row-major order. Every unvisited "on"
//     pixel seeds a new region, grown with an iterative stack over its 8
//     neighbours, while the bounding box is accumulated.
// 3.  **Exterior Test**: A region is exterior iff it touches the frame border or
//     is 4-adjacent to the outside fill. Regions sitting inside another region's
//     hole are dropped, as a contour trace would never report them.
// 4.  **Stateless Utility**: `find_regions` has no memory of previous frames.

use crate::core_modules::frame_region::FrameRegion;
use crate::core_modules::mask::Mask;

const NEIGHBOURS_4: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
const NEIGHBOURS_8: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Finds every exterior region in `mask`, in order of their first scanned pixel.
pub fn find_regions(mask: &Mask) -> Vec<FrameRegion> {
    if mask.width == 0 || mask.height == 0 || mask.is_empty() {
        return Vec::new();
    }

    let outside = fill_outside(mask);
    let mut visited = vec![false; mask.bits.len()];
    let mut regions = Vec::new();

    for y in 0..mask.height {
        for x in 0..mask.width {
            let index = mask.index(x, y);
            if !mask.bits[index] || visited[index] {
                continue;
            }
            if let Some(region) = grow_region(mask, &outside, &mut visited, x, y) {
                regions.push(region);
            }
        }
    }

    regions
}

#[inline]
fn offset(mask: &Mask, x: u32, y: u32, dx: i32, dy: i32) -> Option<(u32, u32)> {
    let nx = x as i64 + dx as i64;
    let ny = y as i64 + dy as i64;
    if nx >= 0 && ny >= 0 && nx < mask.width as i64 && ny < mask.height as i64 {
        Some((nx as u32, ny as u32))
    } else {
        None
    }
}

#[inline]
fn on_border(mask: &Mask, x: u32, y: u32) -> bool {
    x == 0 || y == 0 || x + 1 == mask.width || y + 1 == mask.height
}

/// Marks the background pixels 4-connected to the frame border.
fn fill_outside(mask: &Mask) -> Vec<bool> {
    let mut outside = vec![false; mask.bits.len()];
    let mut stack: Vec<(u32, u32)> = Vec::new();

    let seed = |x: u32, y: u32, outside: &mut Vec<bool>, stack: &mut Vec<(u32, u32)>| {
        let index = mask.index(x, y);
        if !mask.bits[index] && !outside[index] {
            outside[index] = true;
            stack.push((x, y));
        }
    };

    for x in 0..mask.width {
        seed(x, 0, &mut outside, &mut stack);
        seed(x, mask.height - 1, &mut outside, &mut stack);
    }
    for y in 0..mask.height {
        seed(0, y, &mut outside, &mut stack);
        seed(mask.width - 1, y, &mut outside, &mut stack);
    }

    while let Some((x, y)) = stack.pop() {
        for (dx, dy) in NEIGHBOURS_4 {
            if let Some((nx, ny)) = offset(mask, x, y, dx, dy) {
                let index = mask.index(nx, ny);
                if !mask.bits[index] && !outside[index] {
                    outside[index] = true;
                    stack.push((nx, ny));
                }
            }
        }
    }

    outside
}

/// Grows one 8-connected region from a seed; `None` if the region is enclosed.
fn grow_region(
    mask: &Mask,
    outside: &[bool],
    visited: &mut [bool],
    seed_x: u32,
    seed_y: u32,
) -> Option<FrameRegion> {
    let mut stack = vec![(seed_x, seed_y)];
    visited[mask.index(seed_x, seed_y)] = true;

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (seed_x, seed_y, seed_x, seed_y);
    let mut exterior = false;

    while let Some((x, y)) = stack.pop() {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);

        if !exterior {
            exterior = on_border(mask, x, y)
                || NEIGHBOURS_4.iter().any(|&(dx, dy)| {
                    offset(mask, x, y, dx, dy).is_some_and(|(nx, ny)| outside[mask.index(nx, ny)])
                });
        }

        for (dx, dy) in NEIGHBOURS_8 {
            if let Some((nx, ny)) = offset(mask, x, y, dx, dy) {
                let index = mask.index(nx, ny);
                if mask.bits[index] && !visited[index] {
                    visited[index] = true;
                    stack.push((nx, ny));
                }
            }
        }
    }

    exterior.then(|| FrameRegion::from_corners(min_x, min_y, max_x, max_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with(width: u32, height: u32, on: &[(u32, u32, u32, u32)]) -> Mask {
        let mut mask = Mask::empty(width, height);
        for &(x0, y0, w, h) in on {
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    let index = mask.index(x, y);
                    mask.bits[index] = true;
                }
            }
        }
        mask
    }

    #[test]
    fn separate_blocks_become_separate_regions() {
        let mask = mask_with(100, 100, &[(5, 5, 10, 20), (50, 60, 30, 5)]);
        let regions = find_regions(&mask);
        assert_eq!(
            regions,
            vec![FrameRegion::new(5, 5, 10, 20), FrameRegion::new(50, 60, 30, 5)]
        );
    }

    #[test]
    fn diagonal_touch_joins_regions() {
        let mask = mask_with(20, 20, &[(2, 2, 3, 3), (5, 5, 3, 3)]);
        assert_eq!(find_regions(&mask), vec![FrameRegion::new(2, 2, 6, 6)]);
    }

    #[test]
    fn region_inside_a_hole_is_not_exterior() {
        // A ring from (10,10) to (39,39), 3px thick, with a dot in its hole.
        let mask = mask_with(
            50,
            50,
            &[
                (10, 10, 30, 3),
                (10, 37, 30, 3),
                (10, 10, 3, 30),
                (37, 10, 3, 30),
                (24, 24, 2, 2),
            ],
        );
        assert_eq!(find_regions(&mask), vec![FrameRegion::new(10, 10, 30, 30)]);
    }

    #[test]
    fn full_frame_is_one_region() {
        let mask = mask_with(8, 6, &[(0, 0, 8, 6)]);
        assert_eq!(find_regions(&mask), vec![FrameRegion::new(0, 0, 8, 6)]);
    }

    #[test]
    fn empty_mask_has_no_regions() {
        assert!(find_regions(&Mask::empty(16, 16)).is_empty());
        assert!(find_regions(&Mask::empty(0, 0)).is_empty());
    }
}

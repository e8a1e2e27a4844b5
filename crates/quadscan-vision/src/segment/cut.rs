// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Foreground/background cut strategy.
//
// A centred rectangle seeds the foreground; everything outside it is fixed
// background. Each round fits a small colour mixture to each side, builds a
// grid graph whose terminal links carry the colour costs and whose neighbour
// links carry a contrast-sensitive smoothness cost, and takes the minimum cut
// as the new labelling. The resulting mask is cleaned and contoured like the
// other strategies.

use image::{GrayImage, Luma, RgbImage};
use imageproc::edges::canny;
use quadscan_core::error::Result;
use quadscan_core::{Candidate, StrategyKind};
use tracing::debug;

use super::contour::{approximate, describe, external_contours, fit_quad_with_aspect, largest_first};
use super::{Deadline, StrategyInput};
use crate::scan::morphology::clean_mask;

const COMPONENTS: usize = 3;
const KMEANS_ROUNDS: usize = 5;
const MAX_SAMPLES: usize = 4096;
const MIN_VARIANCE: f64 = 4.0;
const SMOOTHNESS: f64 = 50.0;
/// Fore- and background mean colours closer than this mean the cut found nothing.
const MIN_SEPARATION: f64 = 10.0;
const CANNY_LOW: f32 = 75.0;
const CANNY_HIGH: f32 = 200.0;
const TOP_CONTOURS: usize = 5;
const MIN_AREA_FRACTION: f64 = 0.01;
const APPROX_FRACTION: f64 = 0.02;

pub fn foreground_cut(input: &StrategyInput<'_>, deadline: &Deadline) -> Result<Vec<Candidate>> {
    let rgb = &input.working.rgb;
    let (width, height) = rgb.dimensions();
    let margin = (width.min(height) / 50).max(10);
    if width <= 2 * margin + 2 || height <= 2 * margin + 2 {
        return Ok(Vec::new());
    }
    let seed = SeedRect {
        x0: margin,
        y0: margin,
        x1: width - margin,
        y1: height - margin,
    };

    let colors = pixel_colors(rgb);
    let beta = contrast_beta(&colors, width as usize, height as usize);
    let mut labels: Vec<bool> = (0..height)
        .flat_map(|y| (0..width).map(move |x| seed.contains(x, y)))
        .collect();

    for round in 0..input.cascade.cut_iterations.max(1) {
        deadline.check()?;
        let (Some(fg_model), Some(bg_model)) = (
            ColorModel::fit(&samples(&colors, &labels, true)),
            ColorModel::fit(&samples(&colors, &labels, false)),
        ) else {
            return Ok(Vec::new());
        };

        let next = cut_round(&colors, width, seed, beta, &fg_model, &bg_model, deadline)?;
        let changed = next.iter().zip(&labels).filter(|(a, b)| a != b).count();
        labels = next;
        debug!(round, changed, "Cut round finished");
        if changed == 0 {
            break;
        }
    }

    let separation = match (mean_of(&colors, &labels, true), mean_of(&colors, &labels, false)) {
        (Some(fg), Some(bg)) => distance_sq(fg, bg).sqrt(),
        _ => 0.0,
    };
    if separation < MIN_SEPARATION {
        debug!(separation, "Cut foreground indistinguishable from background");
        return Ok(Vec::new());
    }

    let mask = GrayImage::from_fn(width, height, |x, y| {
        Luma([if labels[(y * width + x) as usize] { 255 } else { 0 }])
    });
    let edges = canny(&clean_mask(&mask, 1, 1), CANNY_LOW, CANNY_HIGH);
    deadline.check()?;

    let frame_area = input.working.area();
    let candidates: Vec<Candidate> = largest_first(external_contours(&edges))
        .into_iter()
        .filter(|(area, _)| area / frame_area >= MIN_AREA_FRACTION)
        .take(TOP_CONTOURS)
        .filter_map(|(_, contour)| {
            let quad = fit_quad_with_aspect(
                &contour,
                APPROX_FRACTION,
                input.expected_aspect,
                input.geometry.candidate_aspect_tolerance,
            )?;
            let approx = approximate(&contour, APPROX_FRACTION);
            Some(describe(&contour, &approx, Some(quad), StrategyKind::ForegroundCut))
        })
        .collect();
    debug!(count = candidates.len(), separation, "Cut candidates");
    Ok(candidates)
}

#[derive(Debug, Clone, Copy)]
struct SeedRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl SeedRect {
    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    fn node(&self, x: u32, y: u32) -> usize {
        ((y - self.y0) * self.width() + (x - self.x0)) as usize
    }
}

type Color = [f64; 3];

fn pixel_colors(rgb: &RgbImage) -> Vec<Color> {
    rgb.pixels()
        .map(|p| [p.0[0] as f64, p.0[1] as f64, p.0[2] as f64])
        .collect()
}

fn distance_sq(a: Color, b: Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn samples(colors: &[Color], labels: &[bool], foreground: bool) -> Vec<Color> {
    let selected: Vec<Color> = colors
        .iter()
        .zip(labels)
        .filter(|(_, l)| **l == foreground)
        .map(|(c, _)| *c)
        .collect();
    let stride = (selected.len() / MAX_SAMPLES).max(1);
    selected.into_iter().step_by(stride).collect()
}

fn mean_of(colors: &[Color], labels: &[bool], foreground: bool) -> Option<Color> {
    let mut sum = [0.0; 3];
    let mut count = 0usize;
    for (c, l) in colors.iter().zip(labels) {
        if *l == foreground {
            for i in 0..3 {
                sum[i] += c[i];
            }
            count += 1;
        }
    }
    (count > 0).then(|| sum.map(|s| s / count as f64))
}

/// `1 / (2 * mean squared neighbour difference)`, zero on flat images.
fn contrast_beta(colors: &[Color], width: usize, height: usize) -> f64 {
    let (mut total, mut pairs) = (0.0, 0usize);
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if x + 1 < width {
                total += distance_sq(colors[i], colors[i + 1]);
                pairs += 1;
            }
            if y + 1 < height {
                total += distance_sq(colors[i], colors[i + width]);
                pairs += 1;
            }
        }
    }
    if pairs == 0 || total <= 0.0 {
        0.0
    } else {
        pairs as f64 / (2.0 * total)
    }
}

// -- Colour model -------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Component {
    mean: Color,
    variance: f64,
    weight: f64,
}

/// Isotropic Gaussian mixture fitted by k-means.
#[derive(Debug, Clone)]
struct ColorModel {
    components: Vec<Component>,
}

impl ColorModel {
    fn fit(samples: &[Color]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let k = COMPONENTS.min(samples.len());
        let mut centres: Vec<Color> = (0..k).map(|i| samples[i * samples.len() / k]).collect();
        let mut assignment = vec![0usize; samples.len()];

        for _ in 0..KMEANS_ROUNDS {
            for (slot, sample) in assignment.iter_mut().zip(samples) {
                *slot = nearest(&centres, *sample);
            }
            let mut sums = vec![[0.0; 3]; k];
            let mut counts = vec![0usize; k];
            for (sample, &c) in samples.iter().zip(&assignment) {
                for i in 0..3 {
                    sums[c][i] += sample[i];
                }
                counts[c] += 1;
            }
            for c in 0..k {
                if counts[c] > 0 {
                    centres[c] = sums[c].map(|s| s / counts[c] as f64);
                }
            }
        }

        let mut spread = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for (sample, &c) in samples.iter().zip(&assignment) {
            spread[c] += distance_sq(*sample, centres[c]);
            counts[c] += 1;
        }
        let components = (0..k)
            .filter(|c| counts[*c] > 0)
            .map(|c| Component {
                mean: centres[c],
                variance: (spread[c] / (3.0 * counts[c] as f64)).max(MIN_VARIANCE),
                weight: counts[c] as f64 / samples.len() as f64,
            })
            .collect();
        Some(Self { components })
    }

    /// Negative log-likelihood of `color`.
    fn cost(&self, color: Color) -> f64 {
        let likelihood: f64 = self
            .components
            .iter()
            .map(|c| {
                let norm = (2.0 * std::f64::consts::PI * c.variance).powf(1.5);
                c.weight * (-distance_sq(color, c.mean) / (2.0 * c.variance)).exp() / norm
            })
            .sum();
        -likelihood.max(1e-300).ln()
    }
}

fn nearest(centres: &[Color], sample: Color) -> usize {
    centres
        .iter()
        .enumerate()
        .min_by(|a, b| distance_sq(*a.1, sample).total_cmp(&distance_sq(*b.1, sample)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

// -- Graph cut ----------------------------------------------------------------

/// One labelling pass: build the graph over the seed rectangle and return the
/// minimum-cut labels for the whole image.
fn cut_round(
    colors: &[Color],
    width: u32,
    seed: SeedRect,
    beta: f64,
    fg_model: &ColorModel,
    bg_model: &ColorModel,
    deadline: &Deadline,
) -> Result<Vec<bool>> {
    let nodes = (seed.width() * seed.height()) as usize;
    let (source, sink) = (nodes, nodes + 1);
    let mut graph = FlowGraph::new(nodes + 2);
    let smooth = |a: Color, b: Color| SMOOTHNESS * (-beta * distance_sq(a, b)).exp();

    for y in seed.y0..seed.y1 {
        deadline.check()?;
        for x in seed.x0..seed.x1 {
            let color = colors[(y * width + x) as usize];
            let node = seed.node(x, y);
            let mut fg_cost = fg_model.cost(color);
            let bg_cost = bg_model.cost(color);

            // Neighbours outside the seed are fixed background.
            for (nx, ny) in neighbours(x, y) {
                if !seed.contains(nx, ny) {
                    if let Some(other) = pixel(colors, width, nx, ny) {
                        fg_cost += smooth(color, other);
                    }
                }
            }

            let floor = fg_cost.min(bg_cost);
            graph.add_edge(source, node, bg_cost - floor, 0.0);
            graph.add_edge(node, sink, fg_cost - floor, 0.0);

            if x + 1 < seed.x1 {
                let w = smooth(color, colors[(y * width + x + 1) as usize]);
                graph.add_edge(node, seed.node(x + 1, y), w, w);
            }
            if y + 1 < seed.y1 {
                let w = smooth(color, colors[((y + 1) * width + x) as usize]);
                graph.add_edge(node, seed.node(x, y + 1), w, w);
            }
        }
    }

    graph.max_flow(source, sink, deadline)?;
    let foreground = graph.source_side(source);

    let height = colors.len() as u32 / width.max(1);
    Ok((0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .map(|(x, y)| seed.contains(x, y) && foreground[seed.node(x, y)])
        .collect())
}

fn neighbours(x: u32, y: u32) -> [(u32, u32); 4] {
    [
        (x.wrapping_sub(1), y),
        (x + 1, y),
        (x, y.wrapping_sub(1)),
        (x, y + 1),
    ]
}

fn pixel(colors: &[Color], width: u32, x: u32, y: u32) -> Option<Color> {
    if x >= width {
        return None;
    }
    colors.get((y as usize) * width as usize + x as usize).copied()
}

const NONE: u32 = u32::MAX;
const FLOW_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Arc {
    to: u32,
    next: u32,
    cap: f64,
}

/// Residual graph for Dinic's max-flow. Arcs are stored in pairs so `e ^ 1`
/// is the reverse of `e`.
#[derive(Debug)]
struct FlowGraph {
    head: Vec<u32>,
    arcs: Vec<Arc>,
}

impl FlowGraph {
    fn new(nodes: usize) -> Self {
        Self {
            head: vec![NONE; nodes],
            arcs: Vec::with_capacity(nodes * 8),
        }
    }

    fn add_edge(&mut self, u: usize, v: usize, cap: f64, rev_cap: f64) {
        let e = self.arcs.len() as u32;
        self.arcs.push(Arc {
            to: v as u32,
            next: self.head[u],
            cap,
        });
        self.head[u] = e;
        self.arcs.push(Arc {
            to: u as u32,
            next: self.head[v],
            cap: rev_cap,
        });
        self.head[v] = e + 1;
    }

    fn levels(&self, source: usize) -> Vec<i32> {
        let mut level = vec![-1; self.head.len()];
        let mut queue = std::collections::VecDeque::new();
        level[source] = 0;
        queue.push_back(source);
        while let Some(u) = queue.pop_front() {
            let mut e = self.head[u];
            while e != NONE {
                let arc = self.arcs[e as usize];
                let v = arc.to as usize;
                if arc.cap > FLOW_EPS && level[v] < 0 {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
                e = arc.next;
            }
        }
        level
    }

    fn max_flow(&mut self, source: usize, sink: usize, deadline: &Deadline) -> Result<f64> {
        let mut flow = 0.0;
        loop {
            deadline.check()?;
            let mut level = self.levels(source);
            if level[sink] < 0 {
                return Ok(flow);
            }
            let mut cursor = self.head.clone();
            let mut paths = 0usize;
            loop {
                let pushed = self.augment(source, sink, &mut level, &mut cursor);
                if pushed <= FLOW_EPS {
                    break;
                }
                flow += pushed;
                paths += 1;
                if paths % 1024 == 0 {
                    deadline.check()?;
                }
            }
        }
    }

    /// Push flow along one shortest augmenting path of the level graph.
    fn augment(&mut self, source: usize, sink: usize, level: &mut [i32], cursor: &mut [u32]) -> f64 {
        let mut path: Vec<u32> = Vec::new();
        let mut u = source;
        loop {
            if u == sink {
                let pushed = path
                    .iter()
                    .map(|e| self.arcs[*e as usize].cap)
                    .fold(f64::INFINITY, f64::min);
                for e in &path {
                    self.arcs[*e as usize].cap -= pushed;
                    self.arcs[(*e ^ 1) as usize].cap += pushed;
                }
                return pushed;
            }

            let mut advanced = false;
            while cursor[u] != NONE {
                let e = cursor[u];
                let arc = self.arcs[e as usize];
                let v = arc.to as usize;
                if arc.cap > FLOW_EPS && level[v] == level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                cursor[u] = arc.next;
            }

            if !advanced {
                // Dead end: retire the node and back up one arc.
                level[u] = -1;
                let Some(e) = path.pop() else {
                    return 0.0;
                };
                u = self.arcs[(e ^ 1) as usize].to as usize;
                cursor[u] = self.arcs[e as usize].next;
            }
        }
    }

    /// Nodes reachable from `source` in the residual graph.
    fn source_side(&self, source: usize) -> Vec<bool> {
        let mut seen = vec![false; self.head.len()];
        let mut stack = vec![source];
        seen[source] = true;
        while let Some(u) = stack.pop() {
            let mut e = self.head[u];
            while e != NONE {
                let arc = self.arcs[e as usize];
                if arc.cap > FLOW_EPS && !seen[arc.to as usize] {
                    seen[arc.to as usize] = true;
                    stack.push(arc.to as usize);
                }
                e = arc.next;
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{document, working};
    use super::*;
    use quadscan_core::config::{CascadeConfig, GeometryConfig};
    use std::time::Duration;

    fn run(rgb: RgbImage, expected_aspect: Option<f64>) -> Result<Vec<Candidate>> {
        let img = working(rgb);
        let cascade = CascadeConfig::default();
        let geometry = GeometryConfig::default();
        let input = StrategyInput {
            working: &img,
            expected_aspect,
            cascade: &cascade,
            geometry: &geometry,
        };
        foreground_cut(&input, &Deadline::start(StrategyKind::ForegroundCut, Duration::from_secs(5)))
    }

    #[test]
    fn min_cut_separates_two_nodes() {
        let mut graph = FlowGraph::new(4);
        graph.add_edge(2, 0, 5.0, 0.0);
        graph.add_edge(0, 1, 1.0, 1.0);
        graph.add_edge(1, 3, 5.0, 0.0);
        graph.add_edge(0, 3, 0.5, 0.0);
        let deadline = Deadline::start(StrategyKind::ForegroundCut, Duration::from_secs(1));
        let flow = graph.max_flow(2, 3, &deadline).unwrap();
        assert!((flow - 1.5).abs() < 1e-9);
        let side = graph.source_side(2);
        assert!(side[0] && !side[1]);
    }

    #[test]
    fn colour_model_prefers_its_own_colours() {
        let dark = ColorModel::fit(&[[20.0, 20.0, 20.0]; 10]).unwrap();
        let bright = ColorModel::fit(&[[230.0, 230.0, 230.0]; 10]).unwrap();
        let sample = [25.0, 22.0, 18.0];
        assert!(dark.cost(sample) < bright.cost(sample));
        assert!(ColorModel::fit(&[]).is_none());
    }

    #[test]
    fn cut_isolates_centred_document() {
        let rgb = document(200, 160, (40, 30, 160, 130), [220, 210, 190], [40, 60, 90]);
        let found = run(rgb, None).unwrap();
        assert!(!found.is_empty());
        let bbox = found[0].bounding_box;
        assert!((bbox.center().x - 100.0).abs() < 6.0 && (bbox.center().y - 80.0).abs() < 6.0);
        assert!(bbox.width > 100.0 && bbox.width < 130.0, "{bbox:?}");
    }

    #[test]
    fn flat_frame_yields_nothing() {
        let found = run(RgbImage::from_pixel(120, 100, image::Rgb([100, 100, 100])), None).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn aspect_gate_drops_mismatched_outline() {
        let rgb = document(200, 160, (40, 30, 160, 130), [220, 210, 190], [40, 60, 90]);
        assert!(run(rgb, Some(3.0)).unwrap().is_empty());
    }
}

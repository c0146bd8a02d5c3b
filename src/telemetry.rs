//! Road-network telemetry.
//!
//! The dashboard's map panel shows a small fixed road graph with per-link
//! speeds and congestion levels. No live feed exists for it, so the daemon
//! runs a jittering simulator over the seed topology and publishes a snapshot
//! on the configured update interval. Entirely decoupled from the camera
//! pipeline except that emitted violations bump the incident counter.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Traffic state of one road link, derived from its current speed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Normal,
    Slow,
    Congested,
    Blocked,
}

impl LinkStatus {
    /// Speed bands: 40+ normal, 25+ slow, above zero congested, zero blocked.
    pub fn classify(speed_kmh: u32) -> Self {
        match speed_kmh {
            0 => LinkStatus::Blocked,
            1..=24 => LinkStatus::Congested,
            25..=39 => LinkStatus::Slow,
            _ => LinkStatus::Normal,
        }
    }
}

/// A junction on the map, with a congestion level in `[0, 1]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrafficNode {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub label: String,
    pub congestion: f32,
}

/// A directed road segment between two junctions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrafficLink {
    pub id: String,
    pub source: String,
    pub target: String,
    pub speed_kmh: u32,
    pub status: LinkStatus,
}

/// Aggregate figures for the dashboard's stat cards.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrafficStats {
    pub average_speed_kmh: f64,
    pub active_vehicles: u32,
    /// Mean node congestion, `[0, 1]`.
    pub congestion_index: f32,
    pub incidents_reported: u64,
}

const SPEED_JITTER_KMH: i32 = 7;
const SPEED_MIN_KMH: u32 = 5;
const SPEED_MAX_KMH: u32 = 100;
const CONGESTION_JITTER: f32 = 0.05;

fn node(id: &str, x: f32, y: f32, label: &str, congestion: f32) -> TrafficNode {
    TrafficNode {
        id: id.to_string(),
        x,
        y,
        label: label.to_string(),
        congestion,
    }
}

fn link(id: &str, source: &str, target: &str, speed_kmh: u32) -> TrafficLink {
    TrafficLink {
        id: id.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        speed_kmh,
        status: LinkStatus::classify(speed_kmh),
    }
}

/// The campus road graph the dashboard ships with.
pub fn default_topology() -> (Vec<TrafficNode>, Vec<TrafficLink>) {
    let nodes = vec![
        node("1", 100.0, 100.0, "EXIT", 0.8),
        node("2", 300.0, 100.0, "KPRIET", 0.2),
        node("3", 500.0, 200.0, "CANTEEN", 0.4),
        node("4", 100.0, 300.0, "KPRCAS", 0.6),
        node("5", 300.0, 400.0, "ZIG - ZAG", 0.9),
        node("6", 500.0, 500.0, "ENTERANCE", 0.3),
    ];
    let links = vec![
        link("l1", "1", "2", 60),
        link("l2", "2", "3", 80),
        link("l3", "1", "4", 30),
        link("l4", "4", "5", 20),
        link("l5", "2", "5", 45),
        link("l6", "3", "6", 90),
        link("l7", "5", "6", 15),
    ];
    (nodes, links)
}

/// Random-walk simulator over the seed topology.
pub struct TrafficSimulator {
    nodes: Vec<TrafficNode>,
    links: Vec<TrafficLink>,
    incidents: u64,
}

impl TrafficSimulator {
    pub fn new() -> Self {
        let (nodes, links) = default_topology();
        Self {
            nodes,
            links,
            incidents: 0,
        }
    }

    pub fn nodes(&self) -> &[TrafficNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[TrafficLink] {
        &self.links
    }

    pub fn record_incident(&mut self) {
        self.incidents += 1;
    }

    /// One simulation step: jitter every link speed and node congestion, then
    /// rederive link statuses. Speeds stay in `[5, 100]` so no link drifts
    /// into Blocked on its own.
    pub fn step(&mut self) {
        let mut rng = rand::thread_rng();
        for link in &mut self.links {
            let jitter = rng.gen_range(-SPEED_JITTER_KMH..=SPEED_JITTER_KMH);
            let speed = (link.speed_kmh as i32 + jitter).clamp(SPEED_MIN_KMH as i32, SPEED_MAX_KMH as i32);
            link.speed_kmh = speed as u32;
            link.status = LinkStatus::classify(link.speed_kmh);
        }
        for node in &mut self.nodes {
            let jitter = rng.gen_range(-CONGESTION_JITTER..=CONGESTION_JITTER);
            node.congestion = (node.congestion + jitter).clamp(0.0, 1.0);
        }
    }

    /// Aggregate snapshot for the stat cards. Vehicle count follows the map's
    /// particle density, one per 10 km/h of link speed.
    pub fn stats(&self) -> TrafficStats {
        let link_count = self.links.len().max(1) as f64;
        let average_speed_kmh =
            self.links.iter().map(|l| l.speed_kmh as f64).sum::<f64>() / link_count;
        let active_vehicles = self.links.iter().map(|l| l.speed_kmh / 10).sum();
        let node_count = self.nodes.len().max(1) as f32;
        let congestion_index =
            self.nodes.iter().map(|n| n.congestion).sum::<f32>() / node_count;
        TrafficStats {
            average_speed_kmh,
            active_vehicles,
            congestion_index,
            incidents_reported: self.incidents,
        }
    }
}

impl Default for TrafficSimulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_topology_matches_the_map() {
        let sim = TrafficSimulator::new();
        assert_eq!(sim.nodes().len(), 6);
        assert_eq!(sim.links().len(), 7);
        // Seed statuses derive from the seed speeds.
        assert_eq!(sim.links()[0].status, LinkStatus::Normal);
        assert_eq!(sim.links()[2].status, LinkStatus::Slow);
        assert_eq!(sim.links()[6].status, LinkStatus::Congested);
    }

    #[test]
    fn status_bands_have_hard_edges() {
        assert_eq!(LinkStatus::classify(0), LinkStatus::Blocked);
        assert_eq!(LinkStatus::classify(24), LinkStatus::Congested);
        assert_eq!(LinkStatus::classify(25), LinkStatus::Slow);
        assert_eq!(LinkStatus::classify(39), LinkStatus::Slow);
        assert_eq!(LinkStatus::classify(40), LinkStatus::Normal);
    }

    #[test]
    fn stepping_keeps_values_in_bounds() {
        let mut sim = TrafficSimulator::new();
        for _ in 0..200 {
            sim.step();
        }
        for link in sim.links() {
            assert!((SPEED_MIN_KMH..=SPEED_MAX_KMH).contains(&link.speed_kmh));
            assert_eq!(link.status, LinkStatus::classify(link.speed_kmh));
        }
        for node in sim.nodes() {
            assert!((0.0..=1.0).contains(&node.congestion));
        }
    }

    #[test]
    fn stats_aggregate_the_seed_figures() {
        let mut sim = TrafficSimulator::new();
        sim.record_incident();
        sim.record_incident();

        let stats = sim.stats();
        // Seed speeds sum to 340 over 7 links.
        assert!((stats.average_speed_kmh - 340.0 / 7.0).abs() < 1e-9);
        assert_eq!(stats.active_vehicles, 33);
        assert_eq!(stats.incidents_reported, 2);
        assert!(stats.congestion_index > 0.0 && stats.congestion_index < 1.0);
    }

    #[test]
    fn snapshot_serializes_with_snake_case_keys() {
        let sim = TrafficSimulator::new();
        let json = serde_json::to_string(&sim.links()[0]).expect("serialize");
        assert!(json.contains("\"speed_kmh\""));
        assert!(json.contains("\"normal\""));
    }
}

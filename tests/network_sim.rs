use anetsim::error::ConfigError;
use anetsim::network::{Destination, Packet, PacketType};
use anetsim::sim::config::SimulationConfig;
use anetsim::sim::perf_log::write_summary;
use anetsim::sim::top::NetworkSim;
use anetsim::traffic::config::TrafficPattern;
use toml::{Table, Value};

const DEMO: &str = include_str!("../configs/anet.toml");

fn demo_table() -> Table {
    toml::from_str(DEMO).unwrap()
}

fn set(table: &mut Table, section: &str, key: &str, value: Value) {
    table
        .get_mut(section)
        .and_then(Value::as_table_mut)
        .unwrap()
        .insert(key.to_string(), value);
}

// constant hub queueing: 3 gather cycles at the sender hub, 5 at the receiver hub
fn fixed_queue_config() -> SimulationConfig {
    let mut config = SimulationConfig::from_table(&demo_table()).unwrap();
    config.anet.as_mut().unwrap().queue_model.kind = "fixed".to_string();
    config.queue_model.fixed.delay = 5;
    config
}

fn enabled_sim(config: SimulationConfig) -> NetworkSim {
    let mut sim = NetworkSim::new(config).unwrap();
    sim.enable_models();
    sim
}

#[test]
fn cross_cluster_unicast_latency() {
    let mut sim = enabled_sim(fixed_queue_config());
    sim.inject(Packet::new(0, Destination::Core(10), PacketType::User, 64, 100))
        .unwrap();
    // gather 4 + sender queue 3 + optical 2 + receiver queue 5 + scatter 3 + serialization 16
    assert_eq!(133, sim.run_until_idle().unwrap());
    assert_eq!(1, sim.delivered());

    let summary = sim.model(10).unwrap().summary();
    assert_eq!(1, summary.packets_received);
    assert_eq!(64, summary.bytes_received);
    assert_eq!(33.0, summary.average_packet_latency_ns);
    assert_eq!(0, sim.model(0).unwrap().summary().packets_received);
}

#[test]
fn broadcast_reaches_every_core() {
    let mut sim = enabled_sim(fixed_queue_config());
    sim.inject(Packet::new(3, Destination::Broadcast, PacketType::User, 64, 0))
        .unwrap();
    sim.run_until_idle().unwrap();
    assert_eq!(20, sim.delivered());
    for summary in sim.summaries() {
        assert_eq!(1, summary.packets_received, "core {}", summary.core_id);
        // every cluster, the sender's own included, is reached over the optical network
        assert_eq!(33.0, summary.average_packet_latency_ns, "core {}", summary.core_id);
    }
}

#[test]
fn warm_up_traffic_is_not_counted() {
    let mut config = fixed_queue_config();
    config.traffic.pattern = TrafficPattern::Neighbor;
    config.traffic.warmup_packets = 2;
    config.traffic.num_packets = 1;
    let mut sim = NetworkSim::new(config).unwrap();
    let summary = sim.run().unwrap();

    assert_eq!(60, sim.delivered());
    assert_eq!(20, summary.total.packets_received);
    assert_eq!(20 * 64, summary.total.bytes_received);
    assert!(sim.model(7).unwrap().is_enabled());
}

#[test]
fn multi_process_routing_matches_single_process() {
    let run = |process_count| {
        let mut config = fixed_queue_config();
        config.general.process_count = process_count;
        config.traffic.pattern = TrafficPattern::Neighbor;
        config.traffic.warmup_packets = 0;
        config.traffic.num_packets = 3;
        config.traffic.injection_interval = 50;
        NetworkSim::new(config).unwrap().run().unwrap()
    };
    let single = run(1);
    let multi = run(2);

    assert_eq!(60, single.total.packets_received);
    assert_eq!(single.completion_time, multi.completion_time);
    for (s, m) in single.per_core.iter().zip(&multi.per_core) {
        assert_eq!(s.packets_received, m.packets_received, "core {}", s.core_id);
        assert_eq!(s.bytes_received, m.bytes_received, "core {}", s.core_id);
        assert_eq!(
            s.average_packet_latency_ns, m.average_packet_latency_ns,
            "core {}",
            s.core_id
        );
    }
}

#[test]
fn hotspot_traffic_contends_at_the_receiver_hub() {
    let mut config = SimulationConfig::from_table(&demo_table()).unwrap();
    config.anet.as_mut().unwrap().queue_model.kind = "basic".to_string();
    config.traffic.pattern = TrafficPattern::Hotspot;
    config.traffic.hotspot_core = 10;
    config.traffic.warmup_packets = 0;
    config.traffic.num_packets = 1;
    let summary = NetworkSim::new(config).unwrap().run().unwrap();

    assert_eq!(20, summary.per_core[10].packets_received);
    // core 10 is the hub of cluster 3
    let hub = summary.per_core[10].hub.as_ref().unwrap();
    assert!(matches!(hub.receiver_contention_delay_ns[0], Some(delay) if delay > 0.0));
    assert!(summary.per_core[11].hub.as_ref().unwrap().sender_contention_delay_ns.is_none());
}

#[test]
fn electrical_mesh_counts_xy_hops() {
    let mut table = demo_table();
    set(&mut table, "general", "network_model", Value::String("emesh_hop_counter".into()));
    set(&mut table, "general", "application_cores", Value::Integer(16));
    let mut sim = enabled_sim(SimulationConfig::from_table(&table).unwrap());
    assert!(sim.topology().is_none());

    // 6 hops in a 4 wide mesh at 2 cycles per hop
    sim.inject(Packet::new(0, Destination::Core(15), PacketType::User, 64, 0))
        .unwrap();
    assert_eq!(12, sim.run_until_idle().unwrap());
    assert_eq!(12.0, sim.model(15).unwrap().summary().average_packet_latency_ns);

    sim.inject(Packet::new(5, Destination::Broadcast, PacketType::User, 64, 20))
        .unwrap();
    sim.run_until_idle().unwrap();
    assert_eq!(17, sim.delivered());
}

#[test]
fn run_summary_is_written_as_json() {
    let mut config = fixed_queue_config();
    config.traffic.num_packets = 2;
    config.traffic.warmup_packets = 0;
    let summary = NetworkSim::new(config).unwrap().run().unwrap();

    let path = std::env::temp_dir()
        .join(format!("anetsim_summary_{}", std::process::id()))
        .join("summary.json");
    write_summary(&path, &summary).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!("anet_cluster", json["network_model"]);
    assert_eq!(20, json["per_core"].as_array().unwrap().len());
    assert_eq!(40, json["total"]["packets_received"]);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn invalid_topology_is_rejected() {
    let mut table = demo_table();
    let anet = table
        .get_mut("network")
        .and_then(Value::as_table_mut)
        .and_then(|network| network.get_mut("anet"))
        .and_then(Value::as_table_mut)
        .unwrap();
    anet.insert("cluster_size".to_string(), Value::Integer(3));
    let config = SimulationConfig::from_table(&table).unwrap();
    assert!(matches!(
        NetworkSim::new(config),
        Err(ConfigError::ClusterSizeNotSquare(3))
    ));
}

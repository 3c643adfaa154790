use serde_json::Value;
use std::process::Command;

fn run_stp_ring(args: &[&str]) -> Value {
    let output = Command::new(env!("CARGO_BIN_EXE_stp_ring"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("run stp_ring");
    assert!(
        output.status.success(),
        "stp_ring failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    serde_json::from_str(stdout.lines().last().expect("summary line")).expect("parse summary json")
}

#[test]
fn ring_blocks_exactly_one_port() {
    let out = run_stp_ring(&["--switches", "4"]);
    assert_eq!(out["blocked_ports"], 1);
    let bridges = out["bridges"].as_array().unwrap();
    assert_eq!(bridges.len(), 4);
    assert_eq!(bridges.iter().filter(|b| b["is_root"] == true).count(), 1);
    assert_eq!(bridges[0]["is_root"], true);
}

#[test]
fn root_override_moves_the_root() {
    let out = run_stp_ring(&["--switches", "5", "--root", "3"]);
    let bridges = out["bridges"].as_array().unwrap();
    assert_eq!(bridges[3]["is_root"], true);
    assert_eq!(bridges[3]["root_port"], Value::Null);
    assert_eq!(out["blocked_ports"], 1);
}

#[test]
fn cutting_the_ring_unblocks_everything() {
    let out = run_stp_ring(&["--switches", "4", "--cut", "1"]);
    assert_eq!(out["blocked_ports"], 0);
    let bridges = out["bridges"].as_array().unwrap();
    assert!(bridges.iter().all(|b| b["topology_changes"].as_u64().unwrap() > 0));
}

#[test]
fn hello_ticks_exchange_bpdus() {
    let out = run_stp_ring(&["--hello-ticks", "5"]);
    let received: u64 = out["bridges"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|b| b["ports"].as_array().unwrap().iter())
        .map(|p| p["bpdus"].as_u64().unwrap())
        .sum();
    assert!(received > 0);
    assert_eq!(out["blocked_ports"], 1);
}

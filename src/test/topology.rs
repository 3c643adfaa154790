use crate::addr::RouteEgress;
use crate::net::{
    DeviceKind, LinkParams, NetError, Network, PortId, SwitchportMode,
};

#[test]
fn default_ports_per_kind() {
    let mut net = Network::new();
    let h = net.add_host("pc");
    let s = net.add_switch("sw");
    let r = net.add_router("r");
    let l3 = net.add_device(DeviceKind::L3Switch, "core");
    let fw = net.add_device(DeviceKind::Firewall, "fw");

    assert_eq!(net.device(h).unwrap().interfaces.len(), 1);
    assert_eq!(net.device(s).unwrap().interfaces.len(), 8);
    assert_eq!(net.device(r).unwrap().interfaces.len(), 4);
    assert_eq!(net.device(l3).unwrap().interfaces.len(), 8);
    assert_eq!(net.device(fw).unwrap().interfaces[3].name, "eth3");
    assert_eq!(net.device(s).unwrap().interfaces[0].name, "fa0/1");
    assert_eq!(net.port(r, "GI0/2").unwrap(), PortId::new(r, 2));

    // 全网 MAC 唯一
    let mut macs: Vec<_> = net
        .devices()
        .flat_map(|d| d.interfaces.iter().map(|i| i.mac))
        .collect();
    let total = macs.len();
    macs.sort();
    macs.dedup();
    assert_eq!(macs.len(), total);

    assert!(net.device(s).unwrap().stp.is_some());
    assert!(net.device(r).unwrap().stp.is_none());
}

#[test]
fn connections_are_symmetric_and_exclusive() {
    let mut net = Network::new();
    let a = net.add_host("a");
    let b = net.add_host("b");
    let c = net.add_host("c");
    let pa = PortId::new(a, 0);
    let pb = PortId::new(b, 0);

    let conn = net.add_connection(pa, pb, LinkParams::default()).unwrap();
    assert_eq!(net.peer_of(pa), Some(pb));
    assert_eq!(net.peer_of(pb), Some(pa));
    assert!(net.is_port_active(pa));

    let err = net
        .add_connection(PortId::new(c, 0), pb, LinkParams::default())
        .unwrap_err();
    assert!(matches!(err, NetError::PortInUse(p) if p == pb));
    assert!(matches!(net.connect(a, c, LinkParams::default()), Err(NetError::PortInUse(_))));
    assert_eq!(net.connections().count(), 1);

    net.remove_connection(conn).unwrap();
    assert_eq!(net.peer_of(pa), None);
    assert_eq!(net.peer_of(pb), None);
    assert!(net.connection_of(pa).is_none());
    assert!(matches!(net.remove_connection(conn), Err(NetError::UnknownConnection(_))));
    // 端口重新可用
    net.add_connection(PortId::new(c, 0), pb, LinkParams::default()).unwrap();
}

#[test]
fn invalid_connections_change_nothing() {
    let mut net = Network::new();
    let s = net.add_switch("s");
    let h = net.add_host("h");
    let p = PortId::new(s, 0);
    assert!(matches!(
        net.add_connection(p, p, LinkParams::default()),
        Err(NetError::SelfLoop(_))
    ));
    assert!(matches!(
        net.add_connection(PortId::new(h, 3), p, LinkParams::default()),
        Err(NetError::UnknownPort(_))
    ));
    let bad = LinkParams {
        loss_pct: 150.0,
        ..LinkParams::default()
    };
    assert!(matches!(net.connect(h, s, bad), Err(NetError::InvalidLink(_))));
    let zero = LinkParams {
        bandwidth_mbps: 0,
        ..LinkParams::default()
    };
    assert!(matches!(net.connect(h, s, zero), Err(NetError::InvalidLink(_))));
    assert_eq!(net.connections().count(), 0);

    // 同一交换机上两个端口互连是合法的（不是自环）
    net.connect(s, s, LinkParams::default()).unwrap();
    assert_eq!(net.peer_of(PortId::new(s, 0)), Some(PortId::new(s, 1)));
}

#[test]
fn removing_a_device_removes_its_links() {
    let mut net = Network::new();
    let s = net.add_switch("s");
    let a = net.add_host("a");
    let b = net.add_host("b");
    net.connect(a, s, LinkParams::default()).unwrap();
    net.connect(b, s, LinkParams::default()).unwrap();

    net.remove_device(s).unwrap();
    assert_eq!(net.connections().count(), 0);
    assert_eq!(net.peer_of(PortId::new(a, 0)), None);
    assert!(matches!(net.device(s), Err(NetError::UnknownDevice(_))));
    // id 不复用
    let again = net.add_switch("s2");
    assert_ne!(again, s);
}

#[test]
fn interface_addressing_validation() {
    let mut net = Network::new();
    let h = net.add_host("h");
    let s = net.add_switch("s");
    let r = net.add_router("r");
    let p = PortId::new(h, 0);

    net.configure_interface(p, "10.0.0.5", "/24", Some("10.0.0.1")).unwrap();
    let iface = net.interface(p).unwrap();
    assert_eq!(iface.ip, Some("10.0.0.5".parse().unwrap()));
    assert_eq!(iface.mask, Some("255.255.255.0".parse().unwrap()));

    assert!(matches!(
        net.configure_interface(p, "10.0.0.0", "24", None),
        Err(NetError::NotHostAddress(_))
    ));
    assert!(matches!(
        net.configure_interface(p, "10.0.0.6", "255.255.255.0", Some("10.0.1.1")),
        Err(NetError::GatewayOutsideSubnet(_))
    ));
    assert!(matches!(
        net.configure_interface(p, "10.0.0.6", "255.0.255.0", None),
        Err(NetError::Addr(_))
    ));
    // 失败不改变原配置
    assert_eq!(net.interface(p).unwrap().ip, Some("10.0.0.5".parse().unwrap()));

    assert!(matches!(
        net.configure_interface(PortId::new(s, 0), "10.0.0.9", "24", None),
        Err(NetError::Unsupported { .. })
    ));

    net.configure_interface(PortId::new(r, 2), "172.16.0.1", "16", None).unwrap();
    let route = net.device(r).unwrap().routes.lookup("172.16.9.9".parse().unwrap()).unwrap();
    assert_eq!(route.egress, RouteEgress::Port(2));
    net.clear_interface_address(PortId::new(r, 2)).unwrap();
    assert!(net.device(r).unwrap().routes.is_empty());
}

#[test]
fn static_route_needs_connected_next_hop() {
    let mut net = Network::new();
    let r = net.add_router("r");
    let h = net.add_host("h");
    net.configure_interface(PortId::new(r, 0), "10.0.0.1", "30", None).unwrap();

    assert!(matches!(
        net.add_static_route(r, "192.168.0.0", "16", "10.9.9.9", 1),
        Err(NetError::NextHopUnreachable(_))
    ));
    assert!(matches!(
        net.add_static_route(h, "192.168.0.0", "16", "10.0.0.2", 1),
        Err(NetError::Unsupported { .. })
    ));
    net.add_static_route(r, "192.168.0.0", "16", "10.0.0.2", 1).unwrap();
    assert!(net.remove_static_route(r, "192.168.0.0", "255.255.0.0").unwrap());
    assert!(!net.remove_static_route(r, "192.168.0.0", "255.255.0.0").unwrap());
}

#[test]
fn vlan_configuration() {
    let mut net = Network::new();
    let s = net.add_switch("s");
    let h = net.add_host("h");
    let p = PortId::new(s, 2);

    assert!(matches!(net.create_vlan(s, 0, ""), Err(NetError::InvalidVlan(0))));
    assert!(matches!(net.create_vlan(s, 4095, ""), Err(NetError::InvalidVlan(4095))));
    assert!(matches!(net.create_vlan(h, 10, ""), Err(NetError::Unsupported { .. })));
    assert!(matches!(net.set_access_vlan(p, 10), Err(NetError::UnknownVlan(10))));

    net.create_vlan(s, 10, "").unwrap();
    assert_eq!(net.device(s).unwrap().vlans[&10].name, "VLAN0010");
    net.set_access_vlan(p, 10).unwrap();
    assert_eq!(
        net.interface(p).unwrap().switchport,
        Some(SwitchportMode::Access { vlan: 10 })
    );

    assert!(matches!(net.delete_vlan(s, 1), Err(NetError::DefaultVlan)));
    net.delete_vlan(s, 10).unwrap();
    assert_eq!(net.interface(p).unwrap().switchport, Some(SwitchportMode::default()));
    assert!(matches!(net.delete_vlan(s, 10), Err(NetError::UnknownVlan(10))));

    net.set_trunk(PortId::new(s, 7), 1, Some(vec![10, 20])).unwrap();
    let mode = net.interface(PortId::new(s, 7)).unwrap().switchport.clone().unwrap();
    assert!(mode.carries(20));
    assert!(mode.carries(1));
    assert!(!mode.carries(30));
    assert_eq!(mode.egress_tag(1), None);
    assert_eq!(mode.egress_tag(20), Some(20));
    assert_eq!(mode.ingress_vlan(Some(30)), None);
}

#[test]
fn svi_only_on_l3_switch() {
    let mut net = Network::new();
    let s = net.add_switch("s");
    let core = net.add_device(DeviceKind::L3Switch, "core");
    net.create_vlan(s, 10, "users").unwrap();
    net.create_vlan(core, 10, "users").unwrap();

    assert!(matches!(
        net.create_svi(s, 10, "10.10.0.1", "24"),
        Err(NetError::Unsupported { .. })
    ));
    assert!(matches!(
        net.create_svi(core, 20, "10.20.0.1", "24"),
        Err(NetError::UnknownVlan(20))
    ));
    net.create_svi(core, 10, "10.10.0.1", "24").unwrap();
    let dev = net.device(core).unwrap();
    let svi = dev.svi(10).unwrap();
    assert!(dev.owns_ip("10.10.0.1".parse().unwrap()));
    assert!(dev.owns_mac(svi.mac));
    assert_eq!(
        dev.routes.lookup("10.10.0.77".parse().unwrap()).unwrap().egress,
        RouteEgress::Svi(10)
    );
}

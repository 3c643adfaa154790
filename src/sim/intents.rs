//! 用户意图：ping、UDP、TCP 打开/关闭
//!
//! 意图生成的包挂在发起设备上（at-device），下一次 tick 时交给引擎处理。

use std::net::Ipv4Addr;

use tracing::info;

use super::simulator::Simulator;
use crate::net::{DeviceId, IcmpMessage, NetError, Network, Packet, Payload};

impl Network {
    /// 在设备上打开 TCP 监听；重复监听返回 `Tcp(PortInUse)` 且不改变状态
    pub fn tcp_listen(&mut self, dev: DeviceId, port: u16) -> Result<(), NetError> {
        self.device_mut(dev)?.tcp.listen(port)?;
        Ok(())
    }

    fn resolve_target(&self, from: DeviceId, target: &str) -> Result<(Ipv4Addr, Ipv4Addr), NetError> {
        let dst = self
            .resolve_dns(from, target)
            .ok_or_else(|| NetError::UnknownHost(target.to_string()))?;
        let src = self
            .device(from)?
            .source_ip_for(dst)
            .ok_or(NetError::NoAddress(from))?;
        Ok((src, dst))
    }
}

impl Simulator {
    /// 发送 ICMP echo request；`target` 可以是 IP、主机名或 DNS 名
    pub fn send_ping(
        &mut self,
        net: &mut Network,
        from: DeviceId,
        target: &str,
        seq: u16,
    ) -> Result<u64, NetError> {
        let (src, dst) = net.resolve_target(from, target)?;
        let ident = from.0 as u16;
        let pkt = Packet::icmp(from, src, dst, IcmpMessage::echo_request(ident, seq));
        info!(from = from.0, %src, %dst, seq, "🏓 ping");
        Ok(self.inject(net, pkt))
    }

    pub fn send_udp(
        &mut self,
        net: &mut Network,
        from: DeviceId,
        target: &str,
        dst_port: u16,
        len: u32,
    ) -> Result<u64, NetError> {
        let (src, dst) = net.resolve_target(from, target)?;
        let mut pkt = Packet::ip(from, src, dst, Payload::Udp { len });
        pkt.src_port = Some(dst_port);
        pkt.dst_port = Some(dst_port);
        pkt.size_bytes = pkt.size_bytes.max(42 + len);
        Ok(self.inject(net, pkt))
    }

    /// 主动打开 TCP 连接，返回本地临时端口
    pub fn tcp_connect(
        &mut self,
        net: &mut Network,
        from: DeviceId,
        target: &str,
        port: u16,
    ) -> Result<u16, NetError> {
        let (src, dst) = net.resolve_target(from, target)?;
        let (local_port, syn) = net.device_mut(from)?.tcp.connect(src, dst, port)?;
        let pkt = Packet::tcp(from, (src, local_port), (dst, port), syn);
        info!(from = from.0, local_port, %dst, port, "📞 TCP connect");
        self.inject(net, pkt);
        Ok(local_port)
    }

    /// 关闭 TCP 连接；`remote = None` 关闭该端口上的监听者
    pub fn tcp_close(
        &mut self,
        net: &mut Network,
        dev: DeviceId,
        local_port: u16,
        remote: Option<(Ipv4Addr, u16)>,
    ) -> Result<(), NetError> {
        let table = &mut net.device_mut(dev)?.tcp;
        let local_ip = remote
            .and_then(|(ip, port)| table.find(local_port, ip, port))
            .map(|c| c.local_ip);
        let fin = table.close(local_port, remote)?;
        if let (Some(seg), Some(local_ip), Some((rip, rport))) = (fin, local_ip, remote) {
            let pkt = Packet::tcp(dev, (local_ip, local_port), (rip, rport), seg);
            self.inject(net, pkt);
        }
        Ok(())
    }
}

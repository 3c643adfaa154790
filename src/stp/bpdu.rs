//! BPDU 报文与生成

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::bridge::{BridgeId, PortState};
use crate::addr::MacAddr;
use crate::engine::put_on_link;
use crate::net::{DeviceId, NetError, Network, Packet, Payload, PortId};

pub const STP_PROTOCOL_ID: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BpduType {
    Config,
    Tcn,
}

/// 配置 BPDU（定时器字段按 802.1D 默认值填写，仅作展示）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bpdu {
    pub protocol_id: u16,
    pub bpdu_type: BpduType,
    pub root_bridge_id: BridgeId,
    pub root_path_cost: u32,
    pub sender_bridge_id: BridgeId,
    pub port_id: u16,
    pub topology_change: bool,
    pub message_age: u16,
    pub max_age: u16,
    pub hello_time: u16,
    pub forward_delay: u16,
}

impl Bpdu {
    pub fn config(
        root_bridge_id: BridgeId,
        root_path_cost: u32,
        sender_bridge_id: BridgeId,
        port_id: u16,
    ) -> Self {
        Self {
            protocol_id: STP_PROTOCOL_ID,
            bpdu_type: BpduType::Config,
            root_bridge_id,
            root_path_cost,
            sender_bridge_id,
            port_id,
            topology_change: false,
            message_age: 0,
            max_age: 20,
            hello_time: 2,
            forward_delay: 15,
        }
    }
}

impl Network {
    /// 为一台交换机的每个转发态端口生成一个配置 BPDU，并直接放上链路
    ///
    /// 未启用 STP 的设备返回空列表。
    #[tracing::instrument(skip(self), fields(device = id.0))]
    pub fn generate_bpdus(&self, id: DeviceId) -> Result<Vec<Packet>, NetError> {
        let dev = self.device(id)?;
        let Some(stp) = dev.stp.as_ref().filter(|s| s.enabled) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for (index, port) in stp.ports.iter().enumerate() {
            if port.state != PortState::Forwarding {
                continue;
            }
            let Some(iface) = dev.interfaces.get(index) else {
                continue;
            };
            let mut bpdu =
                Bpdu::config(stp.root_id, stp.root_path_cost, stp.bridge_id, port.port_id);
            bpdu.topology_change = stp.topology_changes > 0;

            let mut pkt = Packet::originate(id, Payload::Stp(bpdu));
            pkt.src_mac = iface.mac;
            pkt.dst_mac = MacAddr::STP_MULTICAST;
            if let Some(pkt) = put_on_link(self, pkt, PortId::new(id, index)) {
                out.push(pkt);
            }
        }
        trace!(count = out.len(), "生成 BPDU");
        Ok(out)
    }
}

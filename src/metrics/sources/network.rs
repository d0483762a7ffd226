use crate::metrics::data::{InterfaceStats, NetworkStats};
use crate::metrics::result::{CollectorData, CollectorResult};
use crate::metrics::traits::Collector;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::Networks;

/// Upper bound on reported interfaces.
pub const MAX_INTERFACES: usize = 50;

/// `IFF_UP` in the sysfs `flags` bitmask.
const IFF_UP: u32 = 0x1;

/// Link state and drop counters read from `/sys/class/net/<if>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub isup: Option<bool>,
    pub rx_dropped: Option<u64>,
    pub tx_dropped: Option<u64>,
}

/// Read one interface's sysfs entry under `root`.
///
/// The `flags` bitmask decides the link state; `operstate` is used when
/// `flags` is missing. Unreadable files leave the field unset.
pub fn read_link_status(root: &Path, interface: &str) -> LinkStatus {
    let dir = root.join(interface);
    let isup = read_trimmed(&dir.join("flags"))
        .and_then(|flags| u32::from_str_radix(flags.trim_start_matches("0x"), 16).ok())
        .map(|flags| flags & IFF_UP != 0)
        .or_else(|| read_trimmed(&dir.join("operstate")).map(|state| state == "up"));

    LinkStatus {
        isup,
        rx_dropped: read_counter(&dir.join("statistics").join("rx_dropped")),
        tx_dropped: read_counter(&dir.join("statistics").join("tx_dropped")),
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_counter(path: &Path) -> Option<u64> {
    read_trimmed(path)?.parse().ok()
}

/// Cumulative network counters, host-wide and per interface.
pub struct NetworkCollector {
    networks: Networks,
    per_interface: bool,
    sysfs_root: Option<PathBuf>,
}

impl NetworkCollector {
    pub fn new(per_interface: bool) -> Self {
        let sysfs_root = cfg!(target_os = "linux").then(|| PathBuf::from("/sys/class/net"));
        Self {
            networks: Networks::new_with_refreshed_list(),
            per_interface,
            sysfs_root,
        }
    }

    /// Read link state from another sysfs tree, or from none at all.
    pub fn with_sysfs_root(mut self, root: Option<PathBuf>) -> Self {
        self.sysfs_root = root;
        self
    }

    fn link_status(&self, interface: &str) -> LinkStatus {
        match &self.sysfs_root {
            Some(root) => read_link_status(root, interface),
            None => LinkStatus::default(),
        }
    }
}

#[async_trait]
impl Collector for NetworkCollector {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn collect(&mut self) -> CollectorResult {
        self.networks.refresh_list();

        let mut totals = NetworkStats::default();
        let mut interfaces = Vec::new();
        for (name, data) in self.networks.iter() {
            let link = self.link_status(name);
            totals.bytes_sent += data.total_transmitted();
            totals.bytes_recv += data.total_received();
            totals.packets_sent += data.total_packets_transmitted();
            totals.packets_recv += data.total_packets_received();
            totals.errin += data.total_errors_on_received();
            totals.errout += data.total_errors_on_transmitted();
            totals.dropin += link.rx_dropped.unwrap_or(0);
            totals.dropout += link.tx_dropped.unwrap_or(0);

            if self.per_interface {
                interfaces.push(InterfaceStats {
                    interface: name.clone(),
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    isup: link.isup,
                });
            }
        }

        let mut data = CollectorData {
            network: Some(totals),
            ..Default::default()
        };
        if self.per_interface {
            interfaces.sort_by(|a, b| a.interface.cmp(&b.interface));
            interfaces.truncate(MAX_INTERFACES);
            data.network_per_interface = Some(interfaces);
        }
        CollectorResult::success(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_totals_cover_every_interface() {
        let mut collector = NetworkCollector::new(true);
        let result = collector.collect().await;
        assert!(result.success);

        let totals = result.data.network.unwrap();
        let interfaces = result.data.network_per_interface.unwrap();
        assert!(interfaces.len() <= MAX_INTERFACES);
        let sent: u64 = interfaces.iter().map(|i| i.bytes_sent).sum();
        assert!(totals.bytes_sent >= sent);
        assert!(interfaces.windows(2).all(|w| w[0].interface <= w[1].interface));
    }

    #[tokio::test]
    async fn test_per_interface_can_be_disabled() {
        let mut collector = NetworkCollector::new(false);
        let result = collector.collect().await;
        assert!(result.data.network.is_some());
        assert!(result.data.network_per_interface.is_none());
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_idle_interface_reads_up_from_flags() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("veth0/flags"), "0x1003\n");
        write(&root.path().join("veth0/operstate"), "unknown\n");
        write(&root.path().join("veth0/statistics/rx_dropped"), "0\n");
        write(&root.path().join("veth0/statistics/tx_dropped"), "0\n");

        let link = read_link_status(root.path(), "veth0");
        assert_eq!(link.isup, Some(true));
        assert_eq!(link.rx_dropped, Some(0));
    }

    #[test]
    fn test_downed_interface_and_drop_counters() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("eth1/flags"), "0x1002\n");
        write(&root.path().join("eth1/statistics/rx_dropped"), "17\n");
        write(&root.path().join("eth1/statistics/tx_dropped"), "4\n");

        let link = read_link_status(root.path(), "eth1");
        assert_eq!(
            link,
            LinkStatus {
                isup: Some(false),
                rx_dropped: Some(17),
                tx_dropped: Some(4),
            }
        );
    }

    #[test]
    fn test_operstate_fallback_and_missing_entry() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("wlan0/operstate"), "up\n");
        assert_eq!(read_link_status(root.path(), "wlan0").isup, Some(true));

        write(&root.path().join("wlan1/operstate"), "down\n");
        assert_eq!(read_link_status(root.path(), "wlan1").isup, Some(false));

        assert_eq!(read_link_status(root.path(), "missing"), LinkStatus::default());
    }

    #[tokio::test]
    async fn test_link_state_unset_without_sysfs() {
        let mut collector = NetworkCollector::new(true).with_sysfs_root(None);
        let result = collector.collect().await;
        let interfaces = result.data.network_per_interface.unwrap();
        assert!(interfaces.iter().all(|i| i.isup.is_none()));
        let totals = result.data.network.unwrap();
        assert_eq!((totals.dropin, totals.dropout), (0, 0));
    }
}

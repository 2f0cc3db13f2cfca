//! Device enumeration and topology matrix construction

use crate::classify::classify;
use crate::link::LinkType;
use crate::provider::{DeviceHandle, TopologySession};
use crate::{Result, TopologyError};

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// N×N matrix of numeric link codes, as published to the node annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopologyMatrix(Vec<Vec<u64>>);

impl TopologyMatrix {
    pub fn new(rows: Vec<Vec<u64>>) -> Self {
        Self(rows)
    }

    /// Number of devices
    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.0
    }

    pub fn get(&self, i: usize, j: usize) -> Option<u64> {
        self.0.get(i).and_then(|row| row.get(j)).copied()
    }

    /// Compact JSON, e.g. `[[0,3],[3,0]]`
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode codes back into link types; unknown codes become `Unknown`
    pub fn to_links(&self) -> LinkMatrix {
        LinkMatrix::new(
            self.0
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|&code| LinkType::from_code(code).unwrap_or_default())
                        .collect()
                })
                .collect(),
        )
    }
}

impl From<&LinkMatrix> for TopologyMatrix {
    fn from(links: &LinkMatrix) -> Self {
        Self(
            links
                .rows()
                .iter()
                .map(|row| row.iter().map(|link| link.code()).collect())
                .collect(),
        )
    }
}

/// N×N matrix of classified links for one collection run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMatrix {
    links: Vec<Vec<LinkType>>,
}

impl LinkMatrix {
    pub fn new(links: Vec<Vec<LinkType>>) -> Self {
        Self { links }
    }

    pub fn size(&self) -> usize {
        self.links.len()
    }

    pub fn rows(&self) -> &[Vec<LinkType>] {
        &self.links
    }

    pub fn get(&self, i: usize, j: usize) -> Option<LinkType> {
        self.links.get(i).and_then(|row| row.get(j)).copied()
    }

    pub fn to_matrix(&self) -> TopologyMatrix {
        TopologyMatrix::from(self)
    }

    /// Ordered pairs `(i, j)`, `i < j`, whose two directions disagree.
    /// A non-empty result points at inconsistent provider data.
    pub fn asymmetric_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.size();
        (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .filter(|&(i, j)| self.get(i, j) != self.get(j, i))
            .collect()
    }

    /// Fixed-width table of display codes, one row per device
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Disabled);

        let mut header = vec![Cell::new("")];
        header.extend((0..self.size()).map(|i| Cell::new(format!("GPU{}", i))));
        table.set_header(header);

        for (i, row) in self.links.iter().enumerate() {
            let mut cells = vec![Cell::new(format!("GPU{}", i))];
            cells.extend(row.iter().map(|link| Cell::new(link.label())));
            table.add_row(cells);
        }

        table.to_string()
    }
}

/// Drives the classifier over every ordered device pair
pub struct MatrixBuilder<'s> {
    session: &'s dyn TopologySession,
}

impl<'s> MatrixBuilder<'s> {
    pub fn new(session: &'s dyn TopologySession) -> Self {
        Self { session }
    }

    /// List device handles in index order.
    ///
    /// Any failed count or handle query aborts the run.
    pub fn enumerate_devices(&self) -> Result<Vec<DeviceHandle>> {
        let count = self.session.device_count().map_err(|e| {
            TopologyError::DeviceEnumeration(format!("unable to get device count: {}", e))
        })?;

        let devices = (0..count)
            .map(|index| {
                self.session.device_handle(index).map_err(|e| {
                    TopologyError::DeviceEnumeration(format!(
                        "unable to get device at index {}: {}",
                        index, e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Enumerated {} GPUs", devices.len());
        Ok(devices)
    }

    /// Classify every ordered pair. `(i, j)` and `(j, i)` are computed
    /// independently and the diagonal is always `Unknown`.
    pub fn build(&self, devices: &[DeviceHandle]) -> LinkMatrix {
        let links = devices
            .iter()
            .enumerate()
            .map(|(i, &src)| {
                devices
                    .iter()
                    .enumerate()
                    .map(|(j, &dest)| {
                        if i == j {
                            LinkType::Unknown
                        } else {
                            classify(self.session, src, dest)
                        }
                    })
                    .collect()
            })
            .collect();
        LinkMatrix::new(links)
    }

    /// Enumerate and build in one step
    pub fn collect(&self) -> Result<LinkMatrix> {
        let devices = self.enumerate_devices()?;
        Ok(self.build(&devices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use crate::provider::{SessionGuard, TopologyLevel};

    fn collect(provider: &MockProvider) -> Result<LinkMatrix> {
        let guard = SessionGuard::open(provider)?;
        let builder = MatrixBuilder::new(guard.session());
        builder.collect()
    }

    #[test]
    fn test_matrix_shape_and_diagonal() {
        for n in 0..6 {
            let provider = MockProvider::with_gpus(n).with_default_level(TopologyLevel::Node);
            let links = collect(&provider).unwrap();
            assert_eq!(links.size(), n as usize);
            for (i, row) in links.rows().iter().enumerate() {
                assert_eq!(row.len(), n as usize);
                assert_eq!(row[i], LinkType::Unknown);
                for (j, link) in row.iter().enumerate() {
                    if i != j {
                        assert_eq!(*link, LinkType::SameCpu);
                    }
                }
            }
            let matrix = links.to_matrix();
            for i in 0..matrix.size() {
                assert_eq!(matrix.get(i, i), Some(0));
            }
        }
    }

    #[test]
    fn test_sample_system() {
        let links = collect(&MockProvider::sample_system()).unwrap();
        assert_eq!(links.get(0, 1), Some(LinkType::TwoLinks));
        assert_eq!(links.get(1, 0), Some(LinkType::TwoLinks));
        assert_eq!(links.get(2, 3), Some(LinkType::TwoLinks));
        assert_eq!(links.get(0, 2), Some(LinkType::CrossCpu));
        assert_eq!(links.get(3, 1), Some(LinkType::CrossCpu));
        assert!(links.asymmetric_pairs().is_empty());

        let matrix = links.to_matrix();
        for row in matrix.rows() {
            for code in row {
                assert!(LinkType::from_code(*code).is_some());
            }
        }
        assert_eq!(
            matrix.to_json().unwrap(),
            "[[0,8,1,1],[8,0,1,1],[1,1,0,8],[1,1,8,0]]"
        );
    }

    #[test]
    fn test_device_count_failure_aborts() {
        let provider = MockProvider::with_gpus(2).fail_device_count();
        let result = collect(&provider);
        assert!(matches!(result, Err(TopologyError::DeviceEnumeration(_))));
        assert_eq!(provider.shutdown_count(), 1);
    }

    #[test]
    fn test_handle_failure_aborts() {
        let provider = MockProvider::with_gpus(3).fail_handle(2);
        let err = collect(&provider).unwrap_err();
        assert!(err.to_string().contains("index 2"));
    }

    #[test]
    fn test_asymmetric_provider_data_is_kept() {
        let provider = MockProvider::with_gpus(2)
            .with_level(0, 1, TopologyLevel::HostBridge)
            .fail_level(1, 0);
        let links = collect(&provider).unwrap();
        assert_eq!(links.get(0, 1), Some(LinkType::HostBridge));
        assert_eq!(links.get(1, 0), Some(LinkType::Unknown));
        assert_eq!(links.asymmetric_pairs(), vec![(0, 1)]);
    }

    #[test]
    fn test_link_failure_degrades_single_pair() {
        let provider = MockProvider::sample_system().fail_link_state(0, 0);
        let links = collect(&provider).unwrap();
        assert_eq!(links.get(0, 1), Some(LinkType::SingleSwitch));
        assert_eq!(links.get(1, 0), Some(LinkType::TwoLinks));
    }

    #[test]
    fn test_render_table() {
        let links = LinkMatrix::new(vec![
            vec![LinkType::Unknown, LinkType::SingleSwitch],
            vec![LinkType::SingleSwitch, LinkType::Unknown],
        ]);
        let table = links.render_table();
        assert!(table.contains("GPU0"));
        assert!(table.contains("GPU1"));
        assert!(table.contains("PIX"));
        assert!(table.contains("N/A"));
        assert_eq!(table.lines().filter(|l| l.contains("PIX")).count(), 2);
    }

    #[test]
    fn test_topology_matrix_serde() {
        let matrix: TopologyMatrix = serde_json::from_str("[[0,3],[3,0]]").unwrap();
        assert_eq!(matrix.size(), 2);
        assert_eq!(matrix.get(0, 1), Some(LinkType::HostBridge.code()));
        assert_eq!(matrix.get(2, 0), None);
    }

    #[test]
    fn test_to_links_maps_unknown_codes() {
        let matrix = TopologyMatrix::new(vec![vec![0, 18], vec![99, 0]]);
        let links = matrix.to_links();
        assert_eq!(links.get(0, 1), Some(LinkType::TwelveLinks));
        assert_eq!(links.get(1, 0), Some(LinkType::Unknown));
    }
}

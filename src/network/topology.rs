use crate::error::ConfigError;
use crate::network::CoreId;

/// Mesh of cores partitioned into square clusters, one optical hub per cluster.
///
/// The mesh is `mesh_width` wide and `mesh_width + 1` high. Clusters are
/// `sqrt_cluster_size` cores on a side; the last row of clusters may overhang the
/// bottom of the mesh, in which case it simply holds fewer cores. The hub of a
/// cluster is the core at its top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    total_cores: usize,
    cluster_size: usize,
    sqrt_cluster_size: usize,
    mesh_width: usize,
    mesh_height: usize,
}

impl TopologyConfig {
    pub fn new(total_cores: u32, cluster_size: u32) -> Result<Self, ConfigError> {
        if total_cores == 0 {
            return Err(ConfigError::Invalid {
                field: "general.total_cores",
                reason: "must be > 0".to_string(),
            });
        }
        let sqrt_cluster_size = (cluster_size as f64).sqrt().floor() as u32;
        if sqrt_cluster_size == 0 || sqrt_cluster_size * sqrt_cluster_size != cluster_size {
            return Err(ConfigError::ClusterSizeNotSquare(cluster_size));
        }

        let mesh_width = (total_cores as f64).sqrt().floor() as u32;
        let mesh_height = (total_cores as f64 / mesh_width as f64).ceil() as u32;
        if mesh_width % sqrt_cluster_size != 0 {
            return Err(ConfigError::MeshWidthNotMultiple {
                width: mesh_width,
                sqrt_cluster_size,
            });
        }
        if mesh_height != mesh_width + 1 {
            return Err(ConfigError::MeshHeightMismatch {
                width: mesh_width,
                height: mesh_height,
            });
        }
        if mesh_width * mesh_height != total_cores {
            return Err(ConfigError::MeshCoreCountMismatch {
                width: mesh_width,
                height: mesh_height,
                total_cores,
            });
        }

        Ok(Self {
            total_cores: total_cores as usize,
            cluster_size: cluster_size as usize,
            sqrt_cluster_size: sqrt_cluster_size as usize,
            mesh_width: mesh_width as usize,
            mesh_height: mesh_height as usize,
        })
    }

    pub fn total_cores(&self) -> usize {
        self.total_cores
    }

    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    pub fn sqrt_cluster_size(&self) -> usize {
        self.sqrt_cluster_size
    }

    pub fn mesh_width(&self) -> usize {
        self.mesh_width
    }

    pub fn mesh_height(&self) -> usize {
        self.mesh_height
    }

    // width of the mesh formed by the clusters themselves
    fn cluster_mesh_width(&self) -> usize {
        self.mesh_width / self.sqrt_cluster_size
    }

    pub fn num_clusters(&self) -> usize {
        self.cluster_mesh_width() * self.mesh_height.div_ceil(self.sqrt_cluster_size)
    }

    pub fn coordinates(&self, core_id: CoreId) -> (usize, usize) {
        (core_id % self.mesh_width, core_id / self.mesh_width)
    }

    pub fn cluster_id_of(&self, core_id: CoreId) -> usize {
        let (core_x, core_y) = self.coordinates(core_id);
        let cluster_x = core_x / self.sqrt_cluster_size;
        let cluster_y = core_y / self.sqrt_cluster_size;
        cluster_y * self.cluster_mesh_width() + cluster_x
    }

    fn hub_coordinates(&self, cluster_id: usize) -> (usize, usize) {
        let cluster_x = cluster_id % self.cluster_mesh_width();
        let cluster_y = cluster_id / self.cluster_mesh_width();
        (
            cluster_x * self.sqrt_cluster_size,
            cluster_y * self.sqrt_cluster_size,
        )
    }

    pub fn hub_core_id_of(&self, cluster_id: usize) -> CoreId {
        let (hub_x, hub_y) = self.hub_coordinates(cluster_id);
        hub_y * self.mesh_width + hub_x
    }

    pub fn is_hub(&self, core_id: CoreId) -> bool {
        self.hub_core_id_of(self.cluster_id_of(core_id)) == core_id
    }

    /// Member cores of a cluster in ascending id order. Cells past the end of the mesh are skipped.
    pub fn cores_in_cluster(&self, cluster_id: usize) -> Vec<CoreId> {
        let (hub_x, hub_y) = self.hub_coordinates(cluster_id);
        let mut cores = Vec::with_capacity(self.cluster_size);
        for y in hub_y..hub_y + self.sqrt_cluster_size {
            for x in hub_x..hub_x + self.sqrt_cluster_size {
                let core_id = y * self.mesh_width + x;
                if core_id < self.total_cores {
                    cores.push(core_id);
                }
            }
        }
        cores
    }

    /// Memory controllers sit on the hubs of the first `num_memory_controllers` clusters.
    /// Only complete clusters are eligible.
    pub fn memory_controller_positions(
        &self,
        num_memory_controllers: usize,
    ) -> Result<Vec<CoreId>, ConfigError> {
        let complete_clusters = self.cluster_mesh_width() * self.cluster_mesh_width();
        if num_memory_controllers > complete_clusters {
            return Err(ConfigError::TooManyMemoryControllers {
                requested: num_memory_controllers,
                available: complete_clusters,
            });
        }
        Ok((0..num_memory_controllers)
            .map(|cluster_id| self.hub_core_id_of(cluster_id))
            .collect())
    }
}

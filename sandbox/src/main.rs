// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Ferry Sandbox
// Streams procedurally generated terrain chunks into a pretend GPU device
// that only the main thread may touch.
//
// Usage: sandbox [loader-config.json]

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ferry_agents::{AsyncLoader, ContextOwner, LoaderConfig, LOADER_NAMESPACE};
use ferry_core::{ContextToken, Finalize, LoadError, LoaderError, Locator};
use ferry_telemetry::MetricsRegistry;

const GRID_SIZE: usize = 64;
const FRAME_TIME: Duration = Duration::from_millis(16);
const MAX_FRAMES: u32 = 600;
const STREAMED_CHUNKS: u64 = 12;

/// CPU-side terrain mesh built on a worker thread.
#[derive(Debug)]
struct TerrainMesh {
    vertices: Vec<[f32; 3]>,
    indices: Vec<u32>,
}

/// Handle to a mesh living on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MeshHandle(u32);

/// Stand-in for a rendering device bound to the main thread.
#[derive(Debug, Default)]
struct Device {
    meshes: Vec<(usize, usize)>,
    uploaded_bytes: usize,
}

impl Device {
    fn upload(&mut self, mesh: &TerrainMesh) -> MeshHandle {
        let handle = MeshHandle(self.meshes.len() as u32);
        self.meshes.push((mesh.vertices.len(), mesh.indices.len()));
        self.uploaded_bytes += std::mem::size_of_val(mesh.vertices.as_slice())
            + std::mem::size_of_val(mesh.indices.as_slice());
        handle
    }
}

struct MeshUploader;

impl Finalize<TerrainMesh> for MeshUploader {
    type Context = Device;
    type Resource = MeshHandle;

    fn finalize(
        &mut self,
        token: &ContextToken,
        device: &mut Device,
        mesh: TerrainMesh,
    ) -> MeshHandle {
        token.debug_assert_owner();
        device.upload(&mesh)
    }
}

// splitmix64, folded into [0, 1).
fn lattice_noise(seed: u64, index: u64) -> f32 {
    let mut z = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(index);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z >> 40) as f32 / (1u64 << 24) as f32
}

/// Loads `terrain/<seed>/<amplitude>` by generating a noisy height grid.
fn generate_terrain(locator: &Locator) -> Result<TerrainMesh, LoadError> {
    let spec = locator
        .as_str()
        .strip_prefix("terrain/")
        .ok_or_else(|| LoadError::not_found(locator))?;
    let (seed, amplitude) = spec
        .split_once('/')
        .ok_or_else(|| LoadError::decode(locator, "expected terrain/<seed>/<amplitude>"))?;
    let seed: u64 = seed
        .parse()
        .map_err(|e| LoadError::decode(locator, format!("bad seed: {e}")))?;
    let amplitude: f32 = amplitude
        .parse()
        .map_err(|e| LoadError::decode(locator, format!("bad amplitude: {e}")))?;

    // Stand-in for disk latency.
    thread::sleep(Duration::from_millis(20));

    let half = (GRID_SIZE / 2) as f32;
    let mut vertices = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
    for x in 0..GRID_SIZE {
        for y in 0..GRID_SIZE {
            let height = lattice_noise(seed, (x * GRID_SIZE + y) as u64) * amplitude;
            vertices.push([x as f32 - half, y as f32 - half, height]);
        }
    }

    let size = GRID_SIZE as u32;
    let mut indices = Vec::with_capacity((GRID_SIZE - 1) * (GRID_SIZE - 1) * 6);
    for x in 0..size - 1 {
        for y in 0..size - 1 {
            indices.extend_from_slice(&[
                x + y * size,
                (x + 1) + y * size,
                x + (y + 1) * size,
                (x + 1) + y * size,
                (x + 1) + (y + 1) * size,
                x + (y + 1) * size,
            ]);
        }
    }

    Ok(TerrainMesh { vertices, indices })
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => LoaderConfig::from_file(&path)?,
        None => LoaderConfig {
            worker_count: 4,
            finalize_budget: Some(3),
            ..LoaderConfig::default()
        },
    };

    let registry = MetricsRegistry::new();
    let loader = AsyncLoader::with_metrics_registry(generate_terrain, config, &registry)
        .context("Failed to create the terrain loader")?;
    let mut owner = ContextOwner::new(Device::default(), loader, MeshUploader);
    owner.start().context("Failed to start loader workers")?;

    // A second thread streams chunks in while the frame loop runs.
    let submitter = owner.submitter();
    let streamer = thread::Builder::new()
        .name("chunk-streamer".to_string())
        .spawn(move || -> Result<u64, LoaderError> {
            for chunk in 0..STREAMED_CHUNKS {
                submitter.submit(format!("terrain/{chunk}/6"))?;
                thread::sleep(Duration::from_millis(5));
            }
            Ok(STREAMED_CHUNKS)
        })
        .context("Failed to spawn the streaming thread")?;

    owner.submit("terrain/99/2.5")?;
    owner.submit("rocks/boulder.obj")?;
    owner.submit("terrain/7/steep")?;
    let expected = STREAMED_CHUNKS as usize + 3;

    let mut finalized = 0;
    let mut frame = 0;
    while finalized < expected && frame < MAX_FRAMES {
        frame += 1;
        for done in owner.cycle() {
            match done.outcome {
                Ok(handle) => {
                    log::info!("Frame {}: {} uploaded as {:?}", frame, done.locator, handle)
                }
                Err(e) => log::warn!("Frame {}: {}", frame, e),
            }
            finalized += 1;
        }
        thread::sleep(FRAME_TIME);
    }

    let streamed = streamer
        .join()
        .map_err(|_| anyhow!("The streaming thread panicked"))??;
    log::info!("Streamer submitted {} chunk(s).", streamed);

    let report = owner.stop()?;
    log::info!(
        "Finished after {} frame(s): {} result(s), {} abandoned, {} discarded.",
        frame,
        finalized,
        report.abandoned,
        report.discarded
    );
    log::info!(
        "Device holds {} mesh(es), {} byte(s) uploaded.",
        owner.context().meshes.len(),
        owner.context().uploaded_bytes
    );
    for metric in registry.namespace_metrics(LOADER_NAMESPACE) {
        log::info!("{} = {:?}", metric.id, metric.value);
    }

    Ok(())
}

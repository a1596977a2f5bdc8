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

use anyhow::Result;
use ferry_agents::{AsyncLoader, ContextOwner, LoaderConfig};
use ferry_core::{ContextToken, ErrorKind, Finalize};
use ferry_lanes::FileLoader;
use std::collections::HashMap;
use std::error::Error;
use std::time::{Duration, Instant};
use tempfile::tempdir;

// --- Test setup: a tiny texture format and a device that stores them ---
#[derive(Debug, PartialEq)]
struct TestTexture {
    width: u16,
    height: u16,
}

fn decode_texture(bytes: &[u8]) -> Result<TestTexture, Box<dyn Error + Send + Sync>> {
    let header: [u8; 4] = bytes
        .get(..4)
        .ok_or("texture header truncated")?
        .try_into()?;
    Ok(TestTexture {
        width: u16::from_le_bytes([header[0], header[1]]),
        height: u16::from_le_bytes([header[2], header[3]]),
    })
}

#[derive(Default)]
struct TextureCache {
    next_handle: u32,
    resident: HashMap<u32, TestTexture>,
}

struct TextureUpload;

impl Finalize<TestTexture> for TextureUpload {
    type Context = TextureCache;
    type Resource = u32;

    fn finalize(
        &mut self,
        _: &ContextToken,
        cache: &mut TextureCache,
        texture: TestTexture,
    ) -> u32 {
        cache.next_handle += 1;
        cache.resident.insert(cache.next_handle, texture);
        cache.next_handle
    }
}
// ---

#[test]
fn textures_stream_from_disk_into_the_cache() -> Result<()> {
    let dir = tempdir()?;
    std::fs::create_dir(dir.path().join("textures"))?;
    std::fs::write(dir.path().join("textures/grass.tex"), [64, 0, 32, 0])?;
    std::fs::write(dir.path().join("textures/broken.tex"), [1])?;

    let config = LoaderConfig {
        worker_count: 2,
        ..LoaderConfig::default()
    };
    let loader = AsyncLoader::new(FileLoader::new(dir.path(), decode_texture), config)?;
    let mut owner = ContextOwner::new(TextureCache::default(), loader, TextureUpload);
    owner.start()?;

    let grass = owner.submit("textures/grass.tex")?;
    let broken = owner.submit("textures/broken.tex")?;
    let absent = owner.submit("textures/absent.tex")?;

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut outcomes = HashMap::new();
    while outcomes.len() < 3 {
        assert!(Instant::now() < deadline, "timed out");
        for done in owner.cycle() {
            outcomes.insert(done.id, done.outcome);
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let handle = *outcomes[&grass].as_ref().unwrap();
    assert_eq!(
        owner.context().resident.get(&handle),
        Some(&TestTexture {
            width: 64,
            height: 32
        })
    );
    assert_eq!(
        outcomes[&broken].as_ref().unwrap_err().kind(),
        ErrorKind::Decode
    );
    assert_eq!(
        outcomes[&absent].as_ref().unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(owner.context().resident.len(), 1);

    owner.stop()?;
    Ok(())
}

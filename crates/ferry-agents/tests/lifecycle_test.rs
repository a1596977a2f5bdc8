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

use ferry_agents::{AsyncLoader, ContextOwner, LoaderConfig, LoaderPhase, ShutdownReport};
use ferry_core::{finalize_fn, ContextToken, LoadError, LoaderError, Locator};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

fn instant_load(locator: &Locator) -> Result<usize, LoadError> {
    Ok(locator.as_str().len())
}

fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn start_is_accepted_once() {
    let mut loader = AsyncLoader::new(instant_load, LoaderConfig::default()).unwrap();
    assert_eq!(loader.phase(), LoaderPhase::Idle);
    assert!(matches!(loader.start(0), Err(LoaderError::NoWorkers)));
    assert_eq!(loader.phase(), LoaderPhase::Idle);

    loader.start(3).unwrap();
    assert_eq!(loader.phase(), LoaderPhase::Running);
    assert_eq!(loader.worker_count(), 3);
    assert!(matches!(loader.start(1), Err(LoaderError::AlreadyStarted)));

    loader.stop().unwrap();
    assert!(matches!(loader.start(1), Err(LoaderError::Stopped)));
}

#[test]
fn stop_is_idempotent_and_closes_submission() {
    let mut loader = AsyncLoader::new(instant_load, LoaderConfig::default()).unwrap();
    let submitter = loader.submitter();
    loader.start(2).unwrap();

    let report = loader.stop().unwrap();
    assert_eq!(report.workers_joined, 2);
    assert_eq!(loader.worker_count(), 0);
    assert_eq!(loader.phase(), LoaderPhase::Stopped);

    let again = loader.stop().unwrap();
    assert_eq!(again, ShutdownReport::default());

    assert!(matches!(loader.submit("late"), Err(LoaderError::Stopped)));
    assert!(matches!(submitter.submit("late"), Err(LoaderError::Stopped)));
    assert!(loader.try_drain().is_empty());
}

#[test]
fn stop_without_start_abandons_queued_requests() {
    let mut loader = AsyncLoader::new(instant_load, LoaderConfig::default()).unwrap();
    loader.submit("a").unwrap();
    loader.submit("b").unwrap();

    let report = loader.stop().unwrap();
    assert_eq!(report.abandoned, 2);
    assert_eq!(report.workers_joined, 0);
    assert_eq!(loader.in_flight(), 0);
    assert_eq!(loader.metrics().discarded_total.get().unwrap(), 2);
}

#[test]
fn stop_while_loading_discards_every_in_flight_result() {
    let started = Arc::new(AtomicUsize::new(0));
    let slow_load = {
        let started = Arc::clone(&started);
        move |locator: &Locator| -> Result<String, LoadError> {
            started.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            Ok(locator.to_string())
        }
    };

    let config = LoaderConfig {
        worker_count: 10,
        ..LoaderConfig::default()
    };
    let loader = AsyncLoader::new(slow_load, config).unwrap();
    let upload = finalize_fn(|_: &ContextToken, uploads: &mut Vec<String>, data: String| {
        uploads.push(data);
    });
    let mut owner = ContextOwner::new(Vec::new(), loader, upload);
    owner.start().unwrap();

    for i in 0..10 {
        owner.submit(format!("texture-{i}.png")).unwrap();
    }
    wait_for("ten loads to start", || started.load(Ordering::SeqCst) == 10);

    let report = owner.stop().unwrap();
    assert_eq!(report.workers_joined, 10);
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.discarded, 10);

    assert!(owner.cycle().is_empty());
    assert!(owner.context().is_empty());
    assert_eq!(owner.loader().in_flight(), 0);
}

#[test]
fn no_worker_touches_the_loader_after_stop() {
    let stopped = Arc::new(AtomicBool::new(false));
    let violations = Arc::new(AtomicUsize::new(0));
    let load = {
        let stopped = Arc::clone(&stopped);
        let violations = Arc::clone(&violations);
        move |_: &Locator| -> Result<(), LoadError> {
            thread::sleep(Duration::from_millis(2));
            if stopped.load(Ordering::SeqCst) {
                violations.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    };

    let mut loader = AsyncLoader::new(load, LoaderConfig::default()).unwrap();
    loader.start(4).unwrap();
    for i in 0..200 {
        loader.submit(format!("mesh-{i}")).unwrap();
    }
    thread::sleep(Duration::from_millis(20));

    loader.stop().unwrap();
    stopped.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));

    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn dropping_a_running_loader_joins_its_workers() {
    let entered = Arc::new(AtomicUsize::new(0));
    let left = Arc::new(AtomicUsize::new(0));
    let load = {
        let entered = Arc::clone(&entered);
        let left = Arc::clone(&left);
        move |_: &Locator| -> Result<(), LoadError> {
            entered.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            left.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    };

    {
        let mut loader = AsyncLoader::new(load, LoaderConfig::default()).unwrap();
        loader.start(2).unwrap();
        for i in 0..6 {
            loader.submit(format!("clip-{i}.ogg")).unwrap();
        }
        wait_for("a load to start", || entered.load(Ordering::SeqCst) > 0);
    }

    assert_eq!(
        entered.load(Ordering::SeqCst),
        left.load(Ordering::SeqCst),
        "a load was still running after drop returned"
    );
}

#[test]
fn worker_threads_carry_the_configured_name() {
    let load = |_: &Locator| -> Result<String, LoadError> {
        Ok(thread::current().name().unwrap_or_default().to_string())
    };
    let config = LoaderConfig {
        thread_name: "asset-io".to_string(),
        ..LoaderConfig::default()
    };
    let mut loader = AsyncLoader::new(load, config).unwrap();
    loader.start(2).unwrap();
    loader.submit("anything").unwrap();

    let mut results = Vec::new();
    wait_for("one result", || {
        results.extend(loader.try_drain());
        !results.is_empty()
    });
    let name = results.remove(0).into_status().unwrap();
    assert!(name == "asset-io-0" || name == "asset-io-1", "got {name}");
}

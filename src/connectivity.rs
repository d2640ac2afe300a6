//! Online/offline tracking with edge-triggered reconnect callbacks.
//!
//! State is fed either by platform events (`set_online`) or by polling a
//! `ReachabilityProbe`. Each actual change of state is reported exactly once.
//! There is no debouncing: a flapping link fires the reconnect callbacks on
//! every offline→online edge, so callbacks must tolerate redundant calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Platform reachability signal.
pub trait ReachabilityProbe: Send + Sync {
    /// `true` if the remote side currently answers.
    fn probe(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

type OnlineCallback = Box<dyn Fn() + Send + Sync>;

pub struct ConnectivityMonitor {
    online: AtomicBool,
    on_online: RwLock<Vec<OnlineCallback>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            on_online: RwLock::new(Vec::new()),
        }
    }

    /// Initialise from the current answer of `probe`.
    pub fn from_probe(probe: &dyn ReachabilityProbe) -> Self {
        Self::new(probe.probe())
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Register a callback run on every offline→online edge.
    pub fn on_online<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_online
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(callback));
    }

    /// Record the current state. Returns the transition if the state changed.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return None;
        }

        if online {
            tracing::info!("Connectivity restored");
            let callbacks = self.on_online.read().unwrap_or_else(PoisonError::into_inner);
            for callback in callbacks.iter() {
                callback();
            }
            Some(Transition::WentOnline)
        } else {
            tracing::info!("Connectivity lost");
            Some(Transition::WentOffline)
        }
    }

    /// Ask `probe` and record the answer.
    pub fn poll(&self, probe: &dyn ReachabilityProbe) -> Option<Transition> {
        self.set_online(probe.probe())
    }
}

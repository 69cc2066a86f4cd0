//! Task construction from offers.
//!
//! The builder is the only component that looks inside an app's resource
//! requirements. Given an app and an offer it either produces a concrete
//! launch descriptor with a full port assignment, or reports no match.

use armada_id::TaskId;
use tracing::debug;

use crate::model::{AppDefinition, Offer, TaskDescriptor};

/// A successful match: the descriptor to launch and the ports it reserved.
#[derive(Debug, Clone)]
pub struct BuiltTask {
    pub descriptor: TaskDescriptor,
    pub ports: Vec<u16>,
}

/// Matches apps to offers.
pub trait TaskBuilder: Send + Sync {
    /// Returns a launch descriptor if the offer can host one task of the
    /// app, `None` otherwise.
    fn build(&self, app: &AppDefinition, offer: &Offer) -> Option<BuiltTask>;
}

/// Default builder: scalar cpu/mem sufficiency plus port reservation from
/// the offer's port ranges.
#[derive(Default)]
pub struct ResourceTaskBuilder;

impl ResourceTaskBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TaskBuilder for ResourceTaskBuilder {
    fn build(&self, app: &AppDefinition, offer: &Offer) -> Option<BuiltTask> {
        if offer.resources.cpus < app.cpus || offer.resources.mem < app.mem {
            debug!(
                app_id = %app.id,
                offer_id = %offer.id,
                offer_cpus = offer.resources.cpus,
                offer_mem = offer.resources.mem,
                "Offer too small"
            );
            return None;
        }

        let ports = assign_ports(&app.ports, &offer.resources.port_ranges)?;

        let task_id = TaskId::for_app(&app.id);
        let descriptor = TaskDescriptor {
            task_id,
            app_id: app.id.clone(),
            agent: offer.agent.clone(),
            cmd: app.cmd.clone(),
            env: app.env.clone(),
            cpus: app.cpus,
            mem: app.mem,
            ports: ports.clone(),
        };

        Some(BuiltTask { descriptor, ports })
    }
}

/// Reserves one offered port per request. A request of `0` takes the next
/// unclaimed offered port; any other value must itself be offered.
fn assign_ports(requested: &[u16], ranges: &[(u16, u16)]) -> Option<Vec<u16>> {
    let mut assigned: Vec<u16> = Vec::with_capacity(requested.len());

    // Fixed requests first so wildcards cannot shadow them.
    for &port in requested.iter().filter(|&&p| p != 0) {
        if !ranges.iter().any(|&(lo, hi)| port >= lo && port <= hi) {
            return None;
        }
        if assigned.contains(&port) {
            return None;
        }
        assigned.push(port);
    }

    let wildcards = requested.iter().filter(|&&p| p == 0).count();
    let mut picked = 0;
    'outer: for &(lo, hi) in ranges {
        for port in lo..=hi {
            if picked == wildcards {
                break 'outer;
            }
            if !assigned.contains(&port) {
                assigned.push(port);
                picked += 1;
            }
        }
    }
    if picked < wildcards {
        return None;
    }

    // Hand ports back in request order: wildcards fill the zero slots.
    let fixed = requested.iter().filter(|&&p| p != 0).count();
    let mut wildcard_ports = assigned.split_off(fixed).into_iter();
    let mut result = Vec::with_capacity(requested.len());
    let mut fixed_ports = assigned.into_iter();
    for &port in requested {
        if port == 0 {
            result.push(wildcard_ports.next()?);
        } else {
            result.push(fixed_ports.next()?);
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use armada_id::{AgentId, AppId, OfferId};
    use chrono::Utc;

    use super::*;
    use crate::model::Resources;

    fn test_app(cpus: f64, mem: f64, ports: Vec<u16>) -> AppDefinition {
        AppDefinition {
            id: AppId::parse("web").unwrap(),
            instances: 1,
            task_rate_limit: 1.0,
            version: Utc::now(),
            cpus,
            mem,
            ports,
            cmd: "./serve".to_string(),
            env: BTreeMap::new(),
        }
    }

    fn test_offer(cpus: f64, mem: f64, port_ranges: Vec<(u16, u16)>) -> Offer {
        Offer {
            id: OfferId::new("O-1"),
            agent: AgentId::new("agent-1"),
            host: "node-1".to_string(),
            attributes: BTreeMap::new(),
            resources: Resources {
                cpus,
                mem,
                port_ranges,
            },
        }
    }

    #[test]
    fn test_build_matches_sufficient_offer() {
        let builder = ResourceTaskBuilder::new();
        let app = test_app(1.0, 128.0, vec![0, 0]);
        let offer = test_offer(2.0, 1024.0, vec![(31000, 31005)]);

        let built = builder.build(&app, &offer).expect("match");
        assert_eq!(built.ports, vec![31000, 31001]);
        assert_eq!(built.descriptor.app_id, app.id);
        assert_eq!(built.descriptor.task_id.app_id(), &app.id);
        assert_eq!(built.descriptor.agent, offer.agent);
    }

    #[test]
    fn test_build_rejects_insufficient_scalars() {
        let builder = ResourceTaskBuilder::new();
        assert!(builder
            .build(&test_app(4.0, 128.0, vec![]), &test_offer(2.0, 1024.0, vec![]))
            .is_none());
        assert!(builder
            .build(&test_app(1.0, 2048.0, vec![]), &test_offer(2.0, 1024.0, vec![]))
            .is_none());
    }

    #[test]
    fn test_fixed_port_must_be_offered() {
        let builder = ResourceTaskBuilder::new();
        let offer = test_offer(2.0, 1024.0, vec![(31000, 31005)]);

        assert!(builder.build(&test_app(1.0, 128.0, vec![31003]), &offer).is_some());
        assert!(builder.build(&test_app(1.0, 128.0, vec![8080]), &offer).is_none());
    }

    #[test]
    fn test_wildcards_avoid_fixed_ports() {
        let app = test_app(1.0, 128.0, vec![0, 31000]);
        let offer = test_offer(2.0, 1024.0, vec![(31000, 31001)]);

        let built = ResourceTaskBuilder::new().build(&app, &offer).expect("match");
        assert_eq!(built.ports, vec![31001, 31000]);
    }

    #[test]
    fn test_not_enough_ports() {
        let app = test_app(1.0, 128.0, vec![0, 0, 0]);
        let offer = test_offer(2.0, 1024.0, vec![(31000, 31001)]);
        assert!(ResourceTaskBuilder::new().build(&app, &offer).is_none());
    }
}

use crate::graph::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// A source received two different values within one tick.
	#[error("conflicting changes to source {node} within one tick")]
	Conflict { node: NodeId },

	/// Propagation came back to a node whose emitter is still running.
	#[error("circular dependency through {node}")]
	CircularDependency { node: NodeId },

	/// The batch kept producing changes past the round limit.
	#[error("runaway updates: changes still pending after {rounds} rounds")]
	RunawayUpdate { rounds: usize },

	#[error("invalid usage: {0}")]
	Usage(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

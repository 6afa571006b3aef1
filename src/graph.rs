use std::rc::Rc;

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::arena::{Arena, Key};
use crate::r#trait::{Body, Trait};
use crate::runtime::Limits;
use crate::scope::Teardown;

pub type NodeId = Key<Node>;
pub(crate) type EdgeId = Key<Edge>;

pub(crate) type Cleanup = Box<dyn FnOnce(Teardown)>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Kind {
	Source,
	Computation,
}

#[doc(hidden)]
pub struct Node {
	pub(crate) kind: Kind,
	pub(crate) body: Option<Body>,
	pub(crate) traits: Rc<[Trait]>,
	pub(crate) disposed: bool,
	pub(crate) age: u64,
	pub(crate) marks: u32,
	pub(crate) updates: u32,
	pub(crate) emitter: Option<Emitter>,
	pub(crate) receiver: Option<Receiver>,
	pub(crate) children: SmallVec<[NodeId; 4]>,
	pub(crate) cleanups: SmallVec<[Cleanup; 2]>,
}

impl Node {
	fn new(kind: Kind, age: u64, traits: Rc<[Trait]>) -> Self {
		Node {
			kind,
			body: None,
			traits,
			disposed: false,
			age,
			marks: 0,
			updates: 0,
			emitter: None,
			receiver: None,
			children: SmallVec::new(),
			cleanups: SmallVec::new(),
		}
	}

	/// Touched during the current tick but not settled yet.
	pub(crate) fn is_stale(&self, clock: u64) -> bool {
		self.age == clock && self.marks != self.updates
	}

	pub(crate) fn is_settled(&self) -> bool {
		self.kind == Kind::Source || self.marks == self.updates
	}
}

/// Fan-out side of a node. Slots are sparse: a deactivated edge leaves `None`
/// behind until the list is compacted.
#[derive(Default)]
pub(crate) struct Emitter {
	pub(crate) emitting: bool,
	pub(crate) edges: Vec<Option<EdgeId>>,
	pub(crate) active: usize,
	pub(crate) edges_age: u32,
}

/// Fan-in side of a node, indexed by source so repeated reads reuse one edge.
#[derive(Default)]
pub(crate) struct Receiver {
	pub(crate) edges: Vec<EdgeId>,
	pub(crate) index: FxHashMap<NodeId, EdgeId>,
	pub(crate) active: usize,
}

pub(crate) struct Edge {
	/// Set while the edge is active.
	pub(crate) from: Option<NodeId>,
	pub(crate) to: NodeId,
	pub(crate) age: u64,
	pub(crate) marked: bool,
	pub(crate) slot: usize,
	pub(crate) slot_age: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
	/// Flag every outbound edge and visit its target.
	Mark,
	/// Visit only flagged edges, clearing the flag.
	Marked,
}

pub(crate) enum Visit {
	End,
	Skip,
	Target(NodeId),
}

fn fragmented(len: usize, active: usize, limits: &Limits) -> bool {
	len > limits.compact_min_edges && len > active.saturating_mul(limits.compact_ratio)
}

#[derive(Default)]
pub(crate) struct Graph {
	pub(crate) nodes: Arena<Node>,
	pub(crate) edges: Arena<Edge>,
}

impl Graph {
	pub fn add_source(&mut self) -> NodeId {
		self.nodes.insert(Node::new(Kind::Source, 0, Rc::from([])))
	}

	pub fn add_computation(&mut self, age: u64, traits: Rc<[Trait]>) -> NodeId {
		self.nodes.insert(Node::new(Kind::Computation, age, traits))
	}

	pub fn node(&self, id: NodeId) -> Option<&Node> {
		self.nodes.get(id)
	}

	pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
		self.nodes.get_mut(id)
	}

	pub fn has_dependents(&self, id: NodeId) -> bool {
		self.node(id)
			.and_then(|node| node.emitter.as_ref())
			.map_or(false, |emitter| emitter.active > 0)
	}

	/// Records that `to` read `from` during the current run, reusing the edge
	/// between them when one exists.
	pub fn add_edge(&mut self, from: NodeId, to: NodeId, clock: u64) {
		if !self.nodes.contains(from) {
			return;
		}

		let existing = match self.nodes.get_mut(to) {
			Some(node) if !node.disposed => node
				.receiver
				.get_or_insert_with(Receiver::default)
				.index
				.get(&from)
				.copied(),
			_ => return,
		};

		let existing = existing.and_then(|id| self.edges.get(id).map(|edge| (id, edge.from.is_some())));

		match existing {
			Some((id, true)) => {
				if let Some(edge) = self.edges.get_mut(id) {
					edge.age = clock;
				}
			}
			Some((id, false)) => self.activate(id, from, clock),
			None => self.insert_edge(from, to, clock),
		}
	}

	fn insert_edge(&mut self, from: NodeId, to: NodeId, clock: u64) {
		let Some(emitter) = self.nodes.get_mut(from).map(|node| node.emitter.get_or_insert_with(Emitter::default)) else {
			return;
		};
		let slot = emitter.edges.len();
		let slot_age = emitter.edges_age;

		let id = self.edges.insert(Edge {
			from: Some(from),
			to,
			age: clock,
			marked: false,
			slot,
			slot_age,
		});

		if let Some(emitter) = self.nodes.get_mut(from).and_then(|node| node.emitter.as_mut()) {
			emitter.edges.push(Some(id));
			emitter.active += 1;
		}

		if let Some(receiver) = self.nodes.get_mut(to).and_then(|node| node.receiver.as_mut()) {
			receiver.edges.push(id);
			receiver.index.insert(from, id);
			receiver.active += 1;
		}
	}

	fn activate(&mut self, id: EdgeId, from: NodeId, clock: u64) {
		let Some(edge) = self.edges.get_mut(id) else {
			return;
		};
		let Some(emitter) = self.nodes.get_mut(from).map(|node| node.emitter.get_or_insert_with(Emitter::default)) else {
			return;
		};

		// The old slot is still ours unless the emitter was compacted since.
		if edge.slot_age == emitter.edges_age && edge.slot < emitter.edges.len() && emitter.edges[edge.slot].is_none() {
			emitter.edges[edge.slot] = Some(id);
		} else {
			edge.slot = emitter.edges.len();
			edge.slot_age = emitter.edges_age;
			emitter.edges.push(Some(id));
		}
		emitter.active += 1;

		edge.from = Some(from);
		edge.age = clock;
		edge.marked = false;

		let to = edge.to;
		if let Some(receiver) = self.nodes.get_mut(to).and_then(|node| node.receiver.as_mut()) {
			receiver.active += 1;
		}
	}

	pub fn deactivate(&mut self, id: EdgeId, limits: &Limits) {
		let Some(edge) = self.edges.get_mut(id) else {
			return;
		};
		let Some(from) = edge.from.take() else {
			return;
		};
		edge.marked = false;
		let (slot, to) = (edge.slot, edge.to);

		let mut compact = false;
		if let Some(emitter) = self.nodes.get_mut(from).and_then(|node| node.emitter.as_mut()) {
			if emitter.edges.get(slot) == Some(&Some(id)) {
				emitter.edges[slot] = None;
			}
			emitter.active = emitter.active.saturating_sub(1);
			// Never reshuffle slots under a running traversal.
			compact = !emitter.emitting && fragmented(emitter.edges.len(), emitter.active, limits);
		}

		if let Some(receiver) = self.nodes.get_mut(to).and_then(|node| node.receiver.as_mut()) {
			receiver.active = receiver.active.saturating_sub(1);
		}

		if compact {
			self.compact_emitter(from);
		}
	}

	fn compact_emitter(&mut self, id: NodeId) {
		let Some(emitter) = self.nodes.get_mut(id).and_then(|node| node.emitter.as_mut()) else {
			return;
		};

		emitter.edges_age = emitter.edges_age.wrapping_add(1);
		let generation = emitter.edges_age;
		let old = std::mem::take(&mut emitter.edges);
		let mut edges = Vec::with_capacity(emitter.active);

		for slot in old.into_iter().flatten() {
			if let Some(edge) = self.edges.get_mut(slot) {
				edge.slot = edges.len();
				edge.slot_age = generation;
				edges.push(Some(slot));
			}
		}

		tracing::trace!(node = %id, edges = edges.len(), "compacted emitter");
		emitter.edges = edges;
	}

	fn compact_receiver(&mut self, id: NodeId) {
		let Some(receiver) = self.nodes.get_mut(id).and_then(|node| node.receiver.as_mut()) else {
			return;
		};

		let old = std::mem::take(&mut receiver.edges);
		receiver.index.clear();

		for slot in old {
			match self.edges.get(slot).and_then(|edge| edge.from) {
				Some(from) => {
					receiver.edges.push(slot);
					receiver.index.insert(from, slot);
				}
				None => {
					self.edges.remove(slot);
				}
			}
		}

		tracing::trace!(node = %id, edges = receiver.edges.len(), "compacted receiver");
	}

	/// Drops inbound edges the last run of `id` did not refresh.
	pub fn prune_receiver(&mut self, id: NodeId, clock: u64, limits: &Limits) {
		let stale: SmallVec<[EdgeId; 8]> = match self.node(id).and_then(|node| node.receiver.as_ref()) {
			Some(receiver) => receiver
				.edges
				.iter()
				.copied()
				.filter(|edge| {
					self.edges
						.get(*edge)
						.map_or(false, |edge| edge.from.is_some() && edge.age < clock)
				})
				.collect(),
			None => return,
		};

		for edge in stale {
			self.deactivate(edge, limits);
		}

		let needs_compaction = self
			.node(id)
			.and_then(|node| node.receiver.as_ref())
			.map_or(false, |receiver| fragmented(receiver.edges.len(), receiver.active, limits));

		if needs_compaction {
			self.compact_receiver(id);
		}
	}

	/// Detaches a node from the graph and frees its slot.
	pub fn remove(&mut self, id: NodeId, limits: &Limits) -> Option<Node> {
		let (inbound, outbound) = {
			let node = self.node(id)?;
			let inbound: Vec<EdgeId> = node.receiver.as_ref().map(|r| r.edges.clone()).unwrap_or_default();
			let outbound: Vec<EdgeId> = node
				.emitter
				.as_ref()
				.map(|e| e.edges.iter().flatten().copied().collect())
				.unwrap_or_default();
			(inbound, outbound)
		};

		for edge in inbound {
			self.deactivate(edge, limits);
			self.edges.remove(edge);
		}

		for edge in outbound {
			self.deactivate(edge, limits);
		}

		self.nodes.remove(id)
	}

	/// Starts a traversal over the outbound edges of `id`. Returns the previous
	/// `emitting` flag, or `None` when the node has no emitter.
	pub fn begin_emit(&mut self, id: NodeId) -> Option<bool> {
		let emitter = self.node_mut(id)?.emitter.as_mut()?;
		Some(std::mem::replace(&mut emitter.emitting, true))
	}

	pub fn end_emit(&mut self, id: NodeId, previous: bool) {
		if let Some(emitter) = self.node_mut(id).and_then(|node| node.emitter.as_mut()) {
			emitter.emitting = previous;
		}
	}

	pub fn visit(&mut self, id: NodeId, index: usize, pass: Pass) -> Visit {
		let slot = match self.node(id).and_then(|node| node.emitter.as_ref()) {
			Some(emitter) => match emitter.edges.get(index) {
				Some(slot) => *slot,
				None => return Visit::End,
			},
			None => return Visit::End,
		};

		let Some(edge) = slot.and_then(|slot| self.edges.get_mut(slot)) else {
			return Visit::Skip;
		};

		match pass {
			Pass::Mark => {
				edge.marked = true;
				Visit::Target(edge.to)
			}
			Pass::Marked if edge.marked => {
				edge.marked = false;
				Visit::Target(edge.to)
			}
			Pass::Marked => Visit::Skip,
		}
	}

	/// Sources of the still-flagged inbound edges of `id`, in read order.
	pub fn marked_sources(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
		let Some(receiver) = self.node(id).and_then(|node| node.receiver.as_ref()) else {
			return SmallVec::new();
		};

		receiver
			.edges
			.iter()
			.filter_map(|edge| self.edges.get(*edge))
			.filter(|edge| edge.marked)
			.filter_map(|edge| edge.from)
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn limits() -> Limits {
		Limits::default()
	}

	fn graph_with(sources: usize) -> (Graph, Vec<NodeId>, NodeId) {
		let mut graph = Graph::default();
		let sources = (0..sources).map(|_| graph.add_source()).collect();
		let sink = graph.add_computation(1, Rc::from([]));
		(graph, sources, sink)
	}

	fn receiver(graph: &Graph, id: NodeId) -> &Receiver {
		graph.node(id).and_then(|n| n.receiver.as_ref()).unwrap()
	}

	fn emitter(graph: &Graph, id: NodeId) -> &Emitter {
		graph.node(id).and_then(|n| n.emitter.as_ref()).unwrap()
	}

	#[test]
	fn repeated_reads_share_one_edge() {
		let (mut graph, sources, sink) = graph_with(1);
		graph.add_edge(sources[0], sink, 1);
		graph.add_edge(sources[0], sink, 1);
		graph.add_edge(sources[0], sink, 1);

		assert_eq!(receiver(&graph, sink).edges.len(), 1);
		assert_eq!(receiver(&graph, sink).active, 1);
		assert_eq!(emitter(&graph, sources[0]).active, 1);
		assert!(graph.has_dependents(sources[0]));
	}

	#[test]
	fn unrefreshed_edges_are_deactivated() {
		let (mut graph, sources, sink) = graph_with(2);
		graph.add_edge(sources[0], sink, 1);
		graph.add_edge(sources[1], sink, 1);

		graph.add_edge(sources[1], sink, 2);
		graph.prune_receiver(sink, 2, &limits());

		assert!(!graph.has_dependents(sources[0]));
		assert!(graph.has_dependents(sources[1]));
		assert_eq!(receiver(&graph, sink).active, 1);
		assert_eq!(emitter(&graph, sources[0]).edges, vec![None]);
	}

	#[test]
	fn reactivation_reuses_its_old_slot() {
		let mut graph = Graph::default();
		let source = graph.add_source();
		let a = graph.add_computation(1, Rc::from([]));
		let b = graph.add_computation(1, Rc::from([]));

		graph.add_edge(source, a, 1);
		graph.add_edge(source, b, 1);
		graph.prune_receiver(a, 2, &limits());
		assert_eq!(emitter(&graph, source).active, 1);

		graph.add_edge(source, a, 3);
		let emitter = emitter(&graph, source);
		assert_eq!(emitter.edges.len(), 2);
		assert_eq!(emitter.active, 2);
		assert!(emitter.edges.iter().all(Option::is_some));
	}

	#[test]
	fn sparse_receiver_is_compacted() {
		let (mut graph, sources, sink) = graph_with(20);
		for source in &sources {
			graph.add_edge(*source, sink, 1);
		}

		graph.add_edge(sources[0], sink, 2);
		graph.prune_receiver(sink, 2, &limits());

		let receiver = receiver(&graph, sink);
		assert_eq!(receiver.edges.len(), 1);
		assert_eq!(receiver.index.len(), 1);
		assert_eq!(graph.edges.len(), 1);
	}

	#[test]
	fn sparse_emitter_is_compacted_and_slots_renumbered() {
		let mut graph = Graph::default();
		let source = graph.add_source();
		let sinks: Vec<_> = (0..20).map(|_| graph.add_computation(1, Rc::from([]))).collect();
		for sink in &sinks {
			graph.add_edge(source, *sink, 1);
		}

		for sink in &sinks[..18] {
			graph.prune_receiver(*sink, 2, &limits());
		}

		let emitter = emitter(&graph, source);
		assert!(emitter.edges.len() <= 10);
		assert_eq!(emitter.active, 2);
		assert!(emitter.edges_age > 0);

		// edges deactivated before the compaction come back in a fresh slot
		graph.add_edge(source, sinks[0], 3);
		let emitter = graph.node(source).and_then(|n| n.emitter.as_ref()).unwrap();
		assert_eq!(emitter.active, 3);
		for (index, slot) in emitter.edges.iter().enumerate() {
			if let Some(edge) = slot.and_then(|slot| graph.edges.get(slot)) {
				assert_eq!(edge.slot, index);
			}
		}
	}

	#[test]
	fn removal_releases_both_sides() {
		let mut graph = Graph::default();
		let source = graph.add_source();
		let middle = graph.add_computation(1, Rc::from([]));
		let sink = graph.add_computation(1, Rc::from([]));
		graph.add_edge(source, middle, 1);
		graph.add_edge(middle, sink, 1);

		assert!(graph.remove(middle, &limits()).is_some());

		assert!(!graph.has_dependents(source));
		assert_eq!(receiver(&graph, sink).active, 0);
		assert!(graph.node(middle).is_none());
	}

	#[test]
	fn marked_pass_visits_flagged_edges_once() {
		let (mut graph, sources, sink) = graph_with(1);
		graph.add_edge(sources[0], sink, 1);

		assert!(matches!(graph.visit(sources[0], 0, Pass::Mark), Visit::Target(t) if t == sink));
		assert_eq!(graph.marked_sources(sink).as_slice(), &[sources[0]]);
		assert!(matches!(graph.visit(sources[0], 0, Pass::Marked), Visit::Target(_)));
		assert!(matches!(graph.visit(sources[0], 0, Pass::Marked), Visit::Skip));
		assert!(matches!(graph.visit(sources[0], 1, Pass::Marked), Visit::End));
	}
}

mod flatten_order;
mod live_rebuild;
mod resolve_graph;
mod support;

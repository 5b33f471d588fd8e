//! Graphviz DOT rendering of the world.
//!
//! One node per worker labelled with its id, kind, and the pearls it holds;
//! one undirected edge per connection labelled with its cost. Output is
//! deterministic for a given world.

use std::fmt::Write as _;

use crate::world_map::World;

/// Render the world as a DOT graph.
pub fn render_dot(world: &World) -> String {
    let mut out = String::from("graph atlantis {\n");

    for worker in world.workers() {
        let mut label = format!("{} - {}", worker.id, worker.kind);
        for pearl in world.pearls_at(worker.id) {
            let _ = write!(label, "\\n{pearl}");
        }
        let load = worker.current_load();
        if load > 0 {
            let _ = write!(label, "\\nload {load}");
        }
        let _ = writeln!(out, "    {} [label=\"{label}\"];", worker.id);
    }

    for (a, b, cost) in world.edges() {
        let _ = writeln!(out, "    {a} -- {b} [label=\"{cost}\"];");
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atlantis_types::WorldDescription;

    use super::*;
    use crate::world_map::build_world;

    #[test]
    fn renders_nodes_pearls_and_edges() {
        let desc = WorldDescription::from_json(
            r#"{"workers":[
                {"id":0,"flavor":"General","desk":[{"id":7,"layers":[{"color":"Red","thickness":2},{"color":"Blue","thickness":1}]}]},
                {"id":1,"flavor":"Vector"}],
              "neighbor_map":[[1,0,3]]}"#,
        )
        .unwrap();
        let dot = render_dot(&build_world(&desc).unwrap());
        assert_eq!(
            dot,
            "graph atlantis {\n    0 [label=\"0 - General\\n7, (R:2) (B:1)\"];\n    1 [label=\"1 - Vector\"];\n    0 -- 1 [label=\"3\"];\n}\n"
        );
    }
}

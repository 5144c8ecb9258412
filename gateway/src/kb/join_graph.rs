// Path and File Name : /root/crate/gateway/src/kb/join_graph.rs
// Details of functionality of this file: the Join Graph and Paths builder (spec §4.3). Builds a
// bidirectional graph from foreign keys and precomputes bounded-depth shortest paths between every
// pair of reachable tables via BFS, replacing the original NetworkX-based implementation.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::kb::types::{FkEdge, JoinGraphDict, JoinGraphEdge, JoinPath, JoinPathHop, KbSchema};

pub struct JoinGraphBuilder {
    nodes: Vec<String>,
    adjacency: HashMap<String, Vec<JoinGraphEdge>>,
}

impl JoinGraphBuilder {
    /// Builds the graph from every table's foreign keys. Each FK produces two edges: child to
    /// parent (fk_column -> ref_column) and the reverse (ref_column -> fk_column), so a BFS from
    /// either side of the relationship can discover the other.
    pub fn build_fk_graph(schema: &KbSchema) -> Self {
        let mut nodes: Vec<String> = schema.tables.keys().cloned().collect();
        nodes.sort();

        let mut adjacency: HashMap<String, Vec<JoinGraphEdge>> =
            nodes.iter().map(|n| (n.clone(), Vec::new())).collect();

        for table in schema.tables.values() {
            for fk in &table.foreign_keys {
                if !adjacency.contains_key(&fk.referenced_table_name) {
                    continue;
                }
                adjacency.entry(table.table.clone()).or_default().push(JoinGraphEdge {
                    from: table.table.clone(),
                    to: fk.referenced_table_name.clone(),
                    from_column: fk.column_name.clone(),
                    to_column: fk.referenced_column_name.clone(),
                    constraint_name: fk.constraint_name.clone(),
                });
                adjacency.entry(fk.referenced_table_name.clone()).or_default().push(JoinGraphEdge {
                    from: fk.referenced_table_name.clone(),
                    to: table.table.clone(),
                    from_column: fk.referenced_column_name.clone(),
                    to_column: fk.column_name.clone(),
                    constraint_name: fk.constraint_name.clone(),
                });
            }
        }

        Self { nodes, adjacency }
    }

    /// Both directions of every FK - child-to-parent and parent-to-child - so the validator's
    /// column-level join check matches regardless of which side of the relationship the query
    /// happens to put first in its ON clause.
    pub fn get_fk_edges(&self, schema: &KbSchema) -> Vec<FkEdge> {
        let mut edges = Vec::new();
        for table in schema.tables.values() {
            for fk in &table.foreign_keys {
                edges.push(FkEdge {
                    from_table: table.table.clone(),
                    from_column: fk.column_name.clone(),
                    to_table: fk.referenced_table_name.clone(),
                    to_column: fk.referenced_column_name.clone(),
                    constraint_name: fk.constraint_name.clone(),
                });
                edges.push(FkEdge {
                    from_table: fk.referenced_table_name.clone(),
                    from_column: fk.referenced_column_name.clone(),
                    to_table: table.table.clone(),
                    to_column: fk.column_name.clone(),
                    constraint_name: fk.constraint_name.clone(),
                });
            }
        }
        edges
    }

    /// BFS shortest path from every node, bounded by max_depth hops, mirroring
    /// `nx.single_source_shortest_path` with a cutoff.
    pub fn compute_join_paths(&self, max_depth: u32) -> HashMap<String, JoinPath> {
        let mut paths = HashMap::new();

        for source in &self.nodes {
            let mut visited: HashSet<String> = HashSet::new();
            visited.insert(source.clone());
            let mut queue: VecDeque<(String, Vec<String>, Vec<JoinPathHop>)> = VecDeque::new();
            queue.push_back((source.clone(), vec![source.clone()], Vec::new()));

            while let Some((current, path, hops)) = queue.pop_front() {
                if path.len() as u32 > max_depth + 1 {
                    continue;
                }
                if current != *source {
                    let key = format!("{source}->{current}");
                    paths.insert(
                        key,
                        JoinPath {
                            from_table: source.clone(),
                            to_table: current.clone(),
                            path: path.clone(),
                            edges: hops.clone(),
                            depth: (path.len() as u32).saturating_sub(1),
                        },
                    );
                }

                if path.len() as u32 >= max_depth + 1 {
                    continue;
                }

                if let Some(edges) = self.adjacency.get(&current) {
                    for edge in edges {
                        if visited.contains(&edge.to) {
                            continue;
                        }
                        visited.insert(edge.to.clone());
                        let mut next_path = path.clone();
                        next_path.push(edge.to.clone());
                        let mut next_hops = hops.clone();
                        next_hops.push(JoinPathHop {
                            from: edge.from.clone(),
                            to: edge.to.clone(),
                            column: edge.from_column.clone(),
                        });
                        queue.push_back((edge.to.clone(), next_path, next_hops));
                    }
                }
            }
        }

        paths
    }

    pub fn validate_join_path(&self, from_table: &str, to_table: &str, paths: &HashMap<String, JoinPath>) -> bool {
        paths.contains_key(&format!("{from_table}->{to_table}"))
    }

    pub fn get_join_depth(path: &JoinPath) -> u32 {
        path.path.len().saturating_sub(1) as u32
    }

    pub fn to_dict(&self) -> JoinGraphDict {
        let mut edges = Vec::new();
        for adj in self.adjacency.values() {
            edges.extend(adj.clone());
        }
        JoinGraphDict { nodes: self.nodes.clone(), edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::types::{ColumnMetadata, ForeignKeyMetadata, RawTableMetadata};

    fn table(name: &str, fks: Vec<ForeignKeyMetadata>) -> RawTableMetadata {
        RawTableMetadata {
            schema: "core".to_string(),
            table: name.to_string(),
            columns: vec![ColumnMetadata {
                column_name: "id".to_string(),
                data_type: "uuid".to_string(),
                is_nullable: false,
                column_default: None,
                character_maximum_length: None,
                numeric_precision: None,
                numeric_scale: None,
                ordinal_position: 1,
                enum_values: None,
                check_constraint_values: None,
            }],
            primary_keys: vec!["id".to_string()],
            foreign_keys: fks,
            indexes: Vec::new(),
            check_constraints: Vec::new(),
            domain: "general".to_string(),
            date_columns: Vec::new(),
            status_columns: Vec::new(),
            natural_key_candidates: Vec::new(),
        }
    }

    fn three_table_schema() -> KbSchema {
        let mut tables = HashMap::new();
        tables.insert("borrowers".to_string(), table("borrowers", Vec::new()));
        tables.insert(
            "loans".to_string(),
            table(
                "loans",
                vec![ForeignKeyMetadata {
                    constraint_name: "loans_borrower_id_fkey".to_string(),
                    table_name: "loans".to_string(),
                    column_name: "borrower_id".to_string(),
                    referenced_schema: "core".to_string(),
                    referenced_table_name: "borrowers".to_string(),
                    referenced_column_name: "id".to_string(),
                }],
            ),
        );
        tables.insert(
            "repayments".to_string(),
            table(
                "repayments",
                vec![ForeignKeyMetadata {
                    constraint_name: "repayments_loan_id_fkey".to_string(),
                    table_name: "repayments".to_string(),
                    column_name: "loan_id".to_string(),
                    referenced_schema: "core".to_string(),
                    referenced_table_name: "loans".to_string(),
                    referenced_column_name: "id".to_string(),
                }],
            ),
        );
        KbSchema { schema_name: "core".to_string(), tables, generated_at: None }
    }

    #[test]
    fn builds_bidirectional_edges_for_each_fk() {
        let schema = three_table_schema();
        let graph = JoinGraphBuilder::build_fk_graph(&schema);
        assert_eq!(graph.adjacency.get("borrowers").unwrap().len(), 1);
        assert_eq!(graph.adjacency.get("loans").unwrap().len(), 2);
    }

    #[test]
    fn finds_two_hop_path_within_depth() {
        let schema = three_table_schema();
        let graph = JoinGraphBuilder::build_fk_graph(&schema);
        let paths = graph.compute_join_paths(4);
        assert!(graph.validate_join_path("repayments", "borrowers", &paths));
        let path = paths.get("repayments->borrowers").unwrap();
        assert_eq!(JoinGraphBuilder::get_join_depth(path), 2);
    }

    #[test]
    fn respects_max_depth_cutoff() {
        let schema = three_table_schema();
        let graph = JoinGraphBuilder::build_fk_graph(&schema);
        let paths = graph.compute_join_paths(1);
        assert!(!graph.validate_join_path("repayments", "borrowers", &paths));
        assert!(graph.validate_join_path("repayments", "loans", &paths));
    }

    #[test]
    fn fk_edges_include_both_directions() {
        let schema = three_table_schema();
        let graph = JoinGraphBuilder::build_fk_graph(&schema);
        let edges = graph.get_fk_edges(&schema);
        assert_eq!(edges.len(), 4);
        assert!(edges
            .iter()
            .any(|e| e.from_table == "loans" && e.from_column == "borrower_id" && e.to_table == "borrowers" && e.to_column == "id"));
        assert!(edges
            .iter()
            .any(|e| e.from_table == "borrowers" && e.from_column == "id" && e.to_table == "loans" && e.to_column == "borrower_id"));
    }
}

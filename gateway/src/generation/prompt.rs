// Path and File Name : /root/crate/gateway/src/generation/prompt.rs
// Details of functionality of this file: builds the single grounded prompt sent to the LLM. The
// prompt carries only the RAG-selected slice of compiled rules, never the full schema, and demands
// a JSON-only response.

use crate::retrieval::RetrievedContext;

pub fn build_prompt(question: &str, conversation_hint: Option<&str>, context: &RetrievedContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You generate a single read-only PostgreSQL SELECT statement from a natural-language \
         question. You must only use the tables and columns listed below. Never use INSERT, \
         UPDATE, DELETE, DDL, or any function that mutates state. Respond with JSON only, no \
         markdown fences, with exactly these keys: sql, confidence, tables_used, intent_summary.\n\n",
    );

    prompt.push_str("Available tables:\n");
    for (name, table) in &context.selected_tables {
        prompt.push_str(&format!("- {name} ({})\n", table.semantic.purpose));
        for column in &table.columns {
            prompt.push_str(&format!("    {} {}\n", column.column_name, column.data_type));
        }
    }

    if !context.join_paths.is_empty() {
        prompt.push_str("\nKnown join paths:\n");
        for path in context.join_paths.values() {
            prompt.push_str(&format!("- {} -> {} via {:?}\n", path.from_table, path.to_table, path.path));
        }
    }

    if let Some(hint) = conversation_hint {
        prompt.push_str(&format!("\nPrior conversation context: {hint}\n"));
    }

    prompt.push_str(&format!("\nQuestion: {question}\n"));
    prompt
}

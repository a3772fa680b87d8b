//! Multi-document splitting.
//!
//! Purely textual: a line whose trimmed content starts with `---` ends the
//! current document. Separator lines belong to no document, and documents
//! that are only whitespace are dropped. An unindented `---` inside a block
//! scalar is therefore treated as a separator.

/// Split `blob` into its documents, in order.
pub fn split_documents(blob: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in blob.lines() {
        if line.trim().starts_with("---") {
            flush(&mut documents, &mut current);
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    flush(&mut documents, &mut current);

    documents
}

fn flush(documents: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        documents.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

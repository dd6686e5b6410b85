use super::{List, SExpr, Tree};

pub(crate) const DEFAULT_INDENT: &str = "\t";

/// Format a number the way KiCad writes schematic coordinates: at most four decimals
/// (100 nm), trailing zeros and a trailing dot stripped.
pub fn format_number(value: f64) -> String {
    let mut out = format!("{value:.4}");
    if out.contains('.') {
        let trimmed = out.trim_end_matches('0').trim_end_matches('.').len();
        out.truncate(trimmed);
    }
    if out == "-0" {
        out.remove(0);
    }
    out
}

pub(super) fn write_tree(tree: &Tree, out: &mut String) {
    if let Some(lead) = &tree.root.lead {
        out.push_str(lead);
    }
    write_list(&tree.root, 0, &tree.indent, out);
    match &tree.epilogue {
        Some(epilogue) => out.push_str(epilogue),
        None => out.push('\n'),
    }
}

pub(super) fn write_expr(expr: &SExpr, indent: &str, out: &mut String) {
    match expr {
        SExpr::List(list) => write_list(list, 0, indent, out),
        atom => write_atom(atom, out),
    }
}

struct Frame<'a> {
    list: &'a List,
    depth: usize,
    next: usize,
}

pub(super) fn write_list(list: &List, depth: usize, indent: &str, out: &mut String) {
    out.push('(');
    let mut stack = vec![Frame {
        list,
        depth,
        next: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        let (list, depth, index) = (frame.list, frame.depth, frame.next);
        if index < list.items.len() {
            frame.next += 1;
            let child = &list.items[index];
            match child.lead() {
                Some(lead) => out.push_str(lead),
                None => synthesize_lead(list, index, depth, indent, out),
            }
            match child {
                SExpr::List(inner) => {
                    out.push('(');
                    stack.push(Frame {
                        list: inner,
                        depth: depth + 1,
                        next: 0,
                    });
                }
                atom => write_atom(atom, out),
            }
        } else {
            match &list.tail {
                Some(tail) => out.push_str(tail),
                None if list.has_list_child() => newline(depth, indent, out),
                None => {}
            }
            out.push(')');
            stack.pop();
        }
    }
}

fn newline(depth: usize, indent: &str, out: &mut String) {
    out.push('\n');
    for _ in 0..depth {
        out.push_str(indent);
    }
}

fn synthesize_lead(parent: &List, index: usize, depth: usize, indent: &str, out: &mut String) {
    if index == 0 {
        return;
    }
    let child = &parent.items[index];
    match child {
        SExpr::List(list) => {
            // coordinate points share a line: (pts\n\t(xy 0 0) (xy 1 0)\n)
            let previous = parent.items[index - 1].as_list().and_then(List::tag);
            if list.tag() == Some("xy") && previous == Some("xy") {
                out.push(' ');
            } else {
                newline(depth + 1, indent, out);
            }
        }
        _ => out.push(' '),
    }
}

fn write_atom(atom: &SExpr, out: &mut String) {
    match atom {
        SExpr::Symbol(atom) if is_bare(&atom.value) => out.push_str(&atom.value),
        SExpr::Symbol(atom) => quote(&atom.value, out),
        SExpr::String(atom) => match &atom.raw {
            Some(raw) => out.push_str(raw),
            None => quote(&atom.value, out),
        },
        SExpr::Number(atom) => match &atom.raw {
            Some(raw) => out.push_str(raw),
            None => out.push_str(&format_number(atom.value)),
        },
        SExpr::List(_) => unreachable!("lists are written by write_list"),
    }
}

/// A symbol can be written unquoted when it contains none of the lexer's delimiters.
fn is_bare(symbol: &str) -> bool {
    !symbol.is_empty()
        && !symbol
            .chars()
            .any(|c| matches!(c, ' ' | '\t' | '\r' | '\x0c' | '\n' | '(' | ')' | '"'))
}

fn quote(value: &str, out: &mut String) {
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

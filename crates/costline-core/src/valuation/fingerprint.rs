use std::collections::{HashSet, VecDeque};
use std::fmt::Write;

use crate::tree::{Category, CostLine, Resolved, TreeIndex};

const SEPARATOR: &str = "|";

/// Deterministic key over a selection and the subtrees it resolves to.
///
/// Categories serialize as `cat:<id>:<name>[...]`, other nodes as
/// `node:<id>:<name>:<kind>[...]` and missing ids as `unknown:<id>`. Any
/// rename, added or removed child, or reordering changes the key. Amounts
/// are not part of it.
///
/// Percentage lines inside the selected subtrees pull in what they select:
/// each one reached is appended once as `ref:<id>(<its selection>)`, so
/// re-pointing a nested line or reshaping one of its targets also changes
/// the key.
pub fn fingerprint(selected_ids: &[String], categories: &[Category]) -> String {
    let index = TreeIndex::build(categories);
    let mut writer = Writer {
        index: &index,
        out: String::new(),
        pending: VecDeque::new(),
        expanded: HashSet::new(),
    };
    writer.selection(selected_ids);

    while let Some(line) = writer.pending.pop_front() {
        writer.out.push_str(SEPARATOR);
        writer.out.push_str("ref:");
        escape_into(&mut writer.out, &line.id);
        writer.out.push('(');
        writer.selection(&line.selected_references);
        writer.out.push(')');
    }
    writer.out
}

struct Writer<'i, 'a> {
    index: &'i TreeIndex<'a>,
    out: String,
    pending: VecDeque<&'i CostLine>,
    expanded: HashSet<&'i str>,
}

impl<'i> Writer<'i, '_> {
    fn selection(&mut self, ids: &[String]) {
        let index = self.index;
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                self.out.push_str(SEPARATOR);
            }
            match index.resolve(id) {
                Some(Resolved::Category(category)) => self.category(category),
                Some(Resolved::Node(node)) => self.line(node.line),
                None => {
                    self.out.push_str("unknown:");
                    escape_into(&mut self.out, id);
                }
            }
        }
    }

    fn category(&mut self, category: &'i Category) {
        self.out.push_str("cat:");
        escape_into(&mut self.out, &category.id);
        self.out.push(':');
        escape_into(&mut self.out, &category.name);
        self.children(&category.children);
    }

    fn line(&mut self, line: &'i CostLine) {
        self.out.push_str("node:");
        escape_into(&mut self.out, &line.id);
        self.out.push(':');
        escape_into(&mut self.out, &line.name);
        let _ = write!(self.out, ":{}", line.kind.as_str());
        if line.is_percentage() && self.expanded.insert(line.id.as_str()) {
            self.pending.push_back(line);
        }
        self.children(&line.children);
    }

    fn children(&mut self, children: &'i [CostLine]) {
        self.out.push('[');
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                self.out.push(',');
            }
            self.line(child);
        }
        self.out.push(']');
    }
}

/// Backslash-escape the characters the key format uses as delimiters.
fn escape_into(out: &mut String, field: &str) {
    for c in field.chars() {
        if matches!(c, '\\' | '|' | ',' | ':' | '[' | ']' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn tree() -> Vec<Category> {
        vec![Category::new(
            "prod",
            "Production",
            vec![
                CostLine::post("dop", "DoP").priced(dec!(5), dec!(1), dec!(800)),
                CostLine::post("gaffer", "Gaffer").priced(dec!(5), dec!(1), dec!(450)),
            ],
        )]
    }

    #[test]
    fn test_format() {
        let fp = fingerprint(&ids(&["prod", "gaffer", "gone"]), &tree());
        assert_eq!(
            fp,
            "cat:prod:Production[node:dop:DoP:post[],node:gaffer:Gaffer:post[]]\
             |node:gaffer:Gaffer:post[]\
             |unknown:gone"
        );
    }

    #[test]
    fn test_stable_over_copies() {
        let a = tree();
        let b = a.clone();
        assert_eq!(
            fingerprint(&ids(&["prod"]), &a),
            fingerprint(&ids(&["prod"]), &b)
        );
    }

    #[test]
    fn test_amounts_do_not_change_key() {
        let a = tree();
        let mut b = tree();
        b[0].children[0].unit_rate = dec!(999);
        assert_eq!(
            fingerprint(&ids(&["prod"]), &a),
            fingerprint(&ids(&["prod"]), &b)
        );
    }

    #[test]
    fn test_structure_changes_key() {
        let base = fingerprint(&ids(&["prod"]), &tree());

        let mut renamed = tree();
        renamed[0].children[1].name = "Chief LX".into();
        assert_ne!(base, fingerprint(&ids(&["prod"]), &renamed));

        let mut reordered = tree();
        reordered[0].children.reverse();
        assert_ne!(base, fingerprint(&ids(&["prod"]), &reordered));

        let mut grown = tree();
        grown[0].children[0]
            .children
            .push(CostLine::sub_post("dop-prep", "Prep day"));
        assert_ne!(base, fingerprint(&ids(&["prod"]), &grown));

        let mut shrunk = tree();
        shrunk[0].children.pop();
        assert_ne!(base, fingerprint(&ids(&["prod"]), &shrunk));
    }

    #[test]
    fn test_empty_selection() {
        assert_eq!(fingerprint(&[], &tree()), "");
    }

    fn with_fee(target: &str) -> Vec<Category> {
        vec![
            Category::new(
                "a",
                "A",
                vec![
                    CostLine::post("x", "X").priced(dec!(1), dec!(1), dec!(1000)),
                    CostLine::post("fee", "Fee").percentage_of(dec!(10), &[target]),
                ],
            ),
            Category::new(
                "b",
                "B",
                vec![CostLine::post("y", "Y").priced(dec!(1), dec!(1), dec!(5000))],
            ),
        ]
    }

    #[test]
    fn test_nested_percentage_line_appends_its_selection() {
        assert_eq!(
            fingerprint(&ids(&["a"]), &with_fee("x")),
            "cat:a:A[node:x:X:post[],node:fee:Fee:post[]]|ref:fee(node:x:X:post[])"
        );
    }

    #[test]
    fn test_repointed_nested_line_changes_key() {
        let sel = ids(&["a"]);
        let before = fingerprint(&sel, &with_fee("x"));
        assert_ne!(before, fingerprint(&sel, &with_fee("y")));

        // a target outside the selection is still tracked
        let mut grown = with_fee("b");
        let base = fingerprint(&sel, &grown);
        grown[1].children.push(CostLine::post("z", "Z"));
        assert_ne!(base, fingerprint(&sel, &grown));
    }

    #[test]
    fn test_self_selecting_line_expands_once() {
        let tree = with_fee("a");
        let fp = fingerprint(&ids(&["a"]), &tree);
        assert_eq!(fp.matches("ref:fee").count(), 1);
    }

    #[test]
    fn test_delimiters_in_names_are_escaped() {
        let spliced = vec![Category::new(
            "c",
            "C",
            vec![CostLine::post("d", "N:post[],node:e:E")],
        )];
        let split = vec![Category::new(
            "c",
            "C",
            vec![CostLine::post("d", "N"), CostLine::post("e", "E")],
        )];
        let sel = ids(&["c"]);
        assert_ne!(fingerprint(&sel, &spliced), fingerprint(&sel, &split));
        assert!(fingerprint(&sel, &spliced).contains(r"N\:post\[\]\,node\:e\:E"));
    }
}

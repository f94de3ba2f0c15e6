//! Minimal structure-data-file scanning: find the first molecule record that
//! parses as a complete molfile.

const RECORD_SEPARATOR: &str = "$$$$";
const END_MARKER: &str = "M  END";

/// Returns the first parsable record (terminated with `$$$$`), or `None`.
pub fn first_valid_molecule(text: &str) -> Option<String> {
    records(text)
        .into_iter()
        .find(|record| is_valid_molfile(record))
        .map(|record| {
            let mut out = record.join("\n");
            out.push('\n');
            out.push_str(RECORD_SEPARATOR);
            out.push('\n');
            out
        })
}

fn records(text: &str) -> Vec<Vec<&str>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim_end() == RECORD_SEPARATOR {
            out.push(std::mem::take(&mut current));
        } else {
            current.push(line);
        }
    }
    if current.iter().any(|l| !l.trim().is_empty()) {
        out.push(current);
    }
    out
}

fn is_valid_molfile(lines: &[&str]) -> bool {
    // Header block is three free-form lines, then the counts line.
    let Some(counts) = lines.get(3) else {
        return false;
    };
    if counts.contains("V3000") {
        return is_valid_v3000(&lines[4..]);
    }

    let (Some(atoms), Some(bonds)) = (count_field(counts, 0..3), count_field(counts, 3..6)) else {
        return false;
    };
    if atoms == 0 {
        return false;
    }

    let body = &lines[4..];
    if body.len() < atoms + bonds {
        return false;
    }
    let (atom_lines, rest) = body.split_at(atoms);
    let (bond_lines, tail) = rest.split_at(bonds);

    atom_lines.iter().all(|l| is_atom_line(l))
        && bond_lines.iter().all(|l| is_bond_line(l, atoms))
        && tail.iter().any(|l| l.trim_end() == END_MARKER)
}

fn count_field(line: &str, range: std::ops::Range<usize>) -> Option<usize> {
    line.get(range)?.trim().parse().ok()
}

fn is_atom_line(line: &str) -> bool {
    let fields: Vec<&str> = line.split_whitespace().collect();
    fields.len() >= 4 && fields[..3].iter().all(|f| f.parse::<f64>().is_ok())
}

fn is_bond_line(line: &str, atoms: usize) -> bool {
    let mut fields = line.split_whitespace();
    let mut atom_ref = || {
        fields
            .next()
            .and_then(|f| f.parse::<usize>().ok())
            .is_some_and(|i| (1..=atoms).contains(&i))
    };
    atom_ref() && atom_ref()
}

fn is_valid_v3000(body: &[&str]) -> bool {
    let atoms = body.iter().find_map(|l| {
        let rest = l.trim().strip_prefix("M  V30 COUNTS")?;
        rest.split_whitespace().next()?.parse::<usize>().ok()
    });
    matches!(atoms, Some(n) if n > 0) && body.iter().any(|l| l.trim_end() == END_MARKER)
}

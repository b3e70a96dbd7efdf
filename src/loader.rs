//! V2000 molfile and SD file reading and writing.

use crate::molecule::{Atom, AtomKind, Bond, Element, Molecule};

use std::{
    collections::BTreeMap,
    fmt::Write,
    fs,
    io,
    num::{ParseFloatError, ParseIntError},
    path::Path,
};

use thiserror::Error;

/// Thrown when a molfile or SD file cannot be read.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("bad integer field: {0}")]
    Int(#[from] ParseIntError),
    #[error("bad coordinate field: {0}")]
    Float(#[from] ParseFloatError),
    #[error("molfile ends before line {0}")]
    Truncated(usize),
    #[error("bond {0} refers to a missing atom")]
    MissingAtom(usize),
    #[error("bond {0} has unsupported type {1}")]
    BondType(usize, usize),
    #[error("no molecule found")]
    Empty,
}

/// One SD file entry: the molecule and its data items.
#[derive(Debug, Clone, Default)]
pub struct SdfRecord {
    pub molecule: Molecule,
    pub properties: BTreeMap<String, String>,
}

/// Read every molecule of a molfile or SD file.
pub fn parse(p: &Path) -> Result<Vec<SdfRecord>, LoadError> {
    let contents = fs::read_to_string(p)?;
    parse_sdf_str(&contents)
}

/// Read the records of an SD file. A plain molfile is a single record.
pub fn parse_sdf_str(contents: &str) -> Result<Vec<SdfRecord>, LoadError> {
    let mut records = Vec::new();
    let mut curr: Vec<&str> = Vec::new();

    for line in contents.lines() {
        if line.trim_end() == "$$$$" {
            if curr.iter().any(|l| !l.trim().is_empty()) {
                records.push(parse_record(&curr)?);
            }
            curr.clear();
        } else {
            curr.push(line);
        }
    }
    if curr.iter().any(|l| !l.trim().is_empty()) {
        records.push(parse_record(&curr)?);
    }

    if records.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(records)
}

/// Read a single molfile block.
pub fn parse_molfile_str(contents: &str) -> Result<Molecule, LoadError> {
    let lines = contents.lines().collect::<Vec<_>>();
    parse_one_molecule(&lines)
}

fn parse_record(lines: &[&str]) -> Result<SdfRecord, LoadError> {
    let end = lines
        .iter()
        .position(|l| l.trim_end() == "M  END")
        .map_or(lines.len(), |i| i + 1);
    let molecule = parse_one_molecule(&lines[..end])?;
    let properties = parse_data_items(&lines[end..]);
    Ok(SdfRecord {
        molecule,
        properties,
    })
}

/// `> <name>` headers, each followed by value lines up to a blank line.
fn parse_data_items(lines: &[&str]) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    let mut i = 0;
    while i < lines.len() {
        let header = lines[i];
        i += 1;
        let Some(name) = header
            .strip_prefix('>')
            .and_then(|rest| rest.split_once('<'))
            .and_then(|(_, rest)| rest.split_once('>'))
            .map(|(name, _)| name.to_string())
        else {
            continue;
        };
        let mut value = Vec::new();
        while i < lines.len() && !lines[i].trim().is_empty() {
            value.push(lines[i].trim_end());
            i += 1;
        }
        properties.insert(name, value.join("\n"));
    }
    properties
}

pub fn parse_one_molecule(mol_data: &[&str]) -> Result<Molecule, LoadError> {
    let mut mol = Molecule::new();

    let counts_line = mol_data.get(3).ok_or(LoadError::Truncated(4))?;
    let (num_atoms, num_bonds) = parse_counts_line(counts_line)?;

    let atom_start = 4;
    let bond_start = atom_start + num_atoms;
    let props_start = bond_start + num_bonds;
    if mol_data.len() < props_start {
        return Err(LoadError::Truncated(props_start));
    }

    // Explicit hydrogens have no atom id.
    let mut atom_ids = Vec::with_capacity(num_atoms);
    for atom_line in &mol_data[atom_start..bond_start] {
        let atom = parse_atom_line(atom_line)?;
        if atom.is_hydrogen() {
            atom_ids.push(None);
        } else {
            atom_ids.push(Some(mol.add_atom(atom)));
        }
    }

    for (i, bond_line) in mol_data[bond_start..props_start].iter().enumerate() {
        let (atom_one, atom_two, bond_type) = parse_bond_line(bond_line)?;
        let lookup = |n: usize| {
            n.checked_sub(1)
                .and_then(|n| atom_ids.get(n).copied())
                .ok_or(LoadError::MissingAtom(i + 1))
        };
        let (Some(u), Some(v)) = (lookup(atom_one)?, lookup(atom_two)?) else {
            continue;
        };
        let bond =
            Bond::try_from(bond_type).map_err(|_| LoadError::BondType(i + 1, bond_type))?;
        mol.add_bond(u, v, bond);
    }

    for line in &mol_data[props_start..] {
        if let Some(rest) = line.strip_prefix("M  RGP") {
            for (atom, rgroup) in parse_rgp_line(rest)? {
                let id = atom
                    .checked_sub(1)
                    .and_then(|n| atom_ids.get(n).copied().flatten());
                if let Some(a) = id.and_then(|id| mol.atom_mut(id)) {
                    if a.is_rsite() {
                        a.set_rsite_index(rgroup);
                    }
                }
            }
        }
    }

    Ok(mol)
}

fn column(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn parse_counts_line(counts_line: &str) -> Result<(usize, usize), ParseIntError> {
    Ok((
        column(counts_line, 0, 3).parse()?,
        column(counts_line, 3, 6).parse()?,
    ))
}

fn parse_atom_line(atom_line: &str) -> Result<Atom, LoadError> {
    let position = [
        column(atom_line, 0, 10).parse()?,
        column(atom_line, 10, 20).parse()?,
        column(atom_line, 20, 30).parse()?,
    ];
    let symbol = column(atom_line, 31, 34);
    let kind = match symbol {
        "R#" => AtomKind::RSite(0),
        "A" | "*" => AtomKind::Any,
        s => match s.parse::<Element>() {
            Ok(e) => AtomKind::Element(e),
            Err(_) => AtomKind::Pseudo(s.to_string()),
        },
    };
    Ok(Atom::from_kind(kind).with_position(position))
}

fn parse_bond_line(bond_line: &str) -> Result<(usize, usize, usize), ParseIntError> {
    Ok((
        column(bond_line, 0, 3).parse()?,
        column(bond_line, 3, 6).parse()?,
        column(bond_line, 6, 9).parse()?,
    ))
}

/// `nnn aaa rrr aaa rrr ...` after the `M  RGP` tag.
fn parse_rgp_line(rest: &str) -> Result<Vec<(usize, u32)>, ParseIntError> {
    let fields = rest.split_whitespace().collect::<Vec<_>>();
    let Some((count, pairs)) = fields.split_first() else {
        return Ok(Vec::new());
    };
    let count: usize = count.parse()?;
    pairs
        .chunks_exact(2)
        .take(count)
        .map(|pair| Ok((pair[0].parse()?, pair[1].parse()?)))
        .collect()
}

/// Write `mol` as a V2000 molfile block ending with `M  END`.
///
/// Atoms are renumbered densely in id order. R-sites with an index are
/// listed in `M  RGP` lines.
pub fn write_molfile(mol: &Molecule, name: &str) -> String {
    let atoms = mol.atom_indices();
    let mut number = BTreeMap::new();
    for (i, &v) in atoms.iter().enumerate() {
        number.insert(v, i + 1);
    }
    let bonds = mol
        .bond_indices()
        .into_iter()
        .filter_map(|e| Some((mol.bond_endpoints(e)?, mol.bond(e)?)))
        .collect::<Vec<_>>();

    let mut out = String::new();
    let _ = writeln!(out, "{name}");
    let _ = writeln!(out, "  scaffold-decomposition");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>3}{:>3}  0  0  0  0  0  0  0  0999 V2000",
        atoms.len(),
        bonds.len()
    );

    let mut rgp = Vec::new();
    for &v in &atoms {
        let Some(atom) = mol.atom(v) else {
            continue;
        };
        let [x, y, z] = atom.position();
        let _ = writeln!(
            out,
            "{x:>10.4}{y:>10.4}{z:>10.4} {:<3} 0  0  0  0  0  0  0  0  0  0  0  0",
            atom.symbol()
        );
        if let Some(idx) = atom.rsite_index().filter(|&idx| idx > 0) {
            rgp.push((number[&v], idx));
        }
    }

    for ((u, v), bond) in bonds {
        let _ = writeln!(
            out,
            "{:>3}{:>3}{:>3}  0",
            number[&u],
            number[&v],
            bond.order()
        );
    }

    for chunk in rgp.chunks(8) {
        let _ = write!(out, "M  RGP{:>3}", chunk.len());
        for (atom, idx) in chunk {
            let _ = write!(out, " {atom:>3} {idx:>3}");
        }
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "M  END");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHENOL: &str = "\
phenol
  hand written

  8  8  0  0  0  0  0  0  0  0999 V2000
    0.0000    1.4000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.2124    0.7000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.2124   -0.7000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    0.0000   -1.4000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
   -1.2124   -0.7000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
   -1.2124    0.7000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    0.0000    2.8000    0.0000 O   0  0  0  0  0  0  0  0  0  0  0  0
    0.9000    3.3000    0.0000 H   0  0  0  0  0  0  0  0  0  0  0  0
  1  2  2  0
  2  3  1  0
  3  4  2  0
  4  5  1  0
  5  6  2  0
  6  1  1  0
  1  7  1  0
  7  8  1  0
M  END
";

    const RGROUP_QUERY: &str = "\
query


  3  2  0  0  0  0  0  0  0  0999 V2000
    0.0000    0.0000    0.0000 C   0  0  0  0  0  0  0  0  0  0  0  0
    1.0000    0.0000    0.0000 R#  0  0  0  0  0  0  0  0  0  0  0  0
   -1.0000    0.0000    0.0000 R#  0  0  0  0  0  0  0  0  0  0  0  0
  1  2  1  0
  1  3  1  0
M  RGP  2   2   1   3   4
M  END
";

    #[test]
    fn hydrogens_are_skipped() {
        let mol = parse_molfile_str(PHENOL).unwrap();
        assert_eq!(mol.atom_count(), 7);
        assert_eq!(mol.bond_count(), 7);
        assert_eq!(mol.formula(), "C6O");
        assert_eq!(mol.atom(6).map(Atom::position), Some([0.0, 2.8, 0.0]));
    }

    #[test]
    fn rgp_lines_set_rsite_indices() {
        let mol = parse_molfile_str(RGROUP_QUERY).unwrap();
        assert_eq!(mol.rsites(), vec![1, 2]);
        assert_eq!(mol.atom(1).and_then(Atom::rsite_index), Some(1));
        assert_eq!(mol.atom(2).and_then(Atom::rsite_index), Some(4));
    }

    #[test]
    fn sdf_records_keep_data_items() {
        let sdf = format!("{PHENOL}> <name>\nphenol\n\n> <id>\n42\n\n$$$$\n{RGROUP_QUERY}$$$$\n");
        let records = parse_sdf_str(&sdf).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].properties["name"], "phenol");
        assert_eq!(records[0].properties["id"], "42");
        assert!(records[1].properties.is_empty());
    }

    #[test]
    fn written_molfile_reads_back() {
        let mol = parse_molfile_str(RGROUP_QUERY).unwrap();
        let text = write_molfile(&mol, "query");
        assert!(text.contains("M  RGP  2   2   1   3   4"));
        let again = parse_molfile_str(&text).unwrap();
        assert_eq!(again.atom_count(), 3);
        assert_eq!(again.atom(2).and_then(Atom::rsite_index), Some(4));
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(matches!(
            parse_molfile_str("x\n\n\n  3  0  0\n"),
            Err(LoadError::Truncated(7))
        ));
        assert!(matches!(parse_sdf_str("\n\n"), Err(LoadError::Empty)));
    }
}

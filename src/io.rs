//! Trajectory file I/O: a compact binary layout for the final
//! trajectories, plus an optional structured JSON dump of intersections
//! for debugging.
//!
//! The binary format is written by hand with `write_all`, the way
//! `mesh-io`'s `medit` serializer writes its little-endian sections,
//! rather than pulling in a new serialization crate for a format this
//! small: one `[float32 n][float32 x n*(d+1)]` record per trajectory.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use crate::balancer::WireIntersection;
use crate::detector::Intersection;
use crate::simplex::SimplexId;
use crate::trajectory::Trajectory;

/// Writes every trajectory as `[float32 n][float32 x n*(d+1)]`, `n` being
/// the point count and each point serialized as `dim` coordinates
/// followed by its scalar value.
pub fn write_trajectories<W: Write>(writer: &mut W, trajectories: &[Trajectory]) -> io::Result<()> {
    for trajectory in trajectories {
        writer.write_all(&(trajectory.len() as f32).to_le_bytes())?;
        for (x, val) in &trajectory.points {
            for c in x.iter() {
                writer.write_all(&(*c as f32).to_le_bytes())?;
            }
            writer.write_all(&(*val as f32).to_le_bytes())?;
        }
    }
    Ok(())
}

/// Reads back trajectories written by [`write_trajectories`]. `dim` must
/// match the dimension they were written with (the format doesn't encode
/// it).
pub fn read_trajectories<R: Read>(reader: &mut R, dim: usize) -> io::Result<Vec<Trajectory>> {
    let mut trajectories = Vec::new();
    let mut count_bytes = [0u8; 4];
    loop {
        match reader.read_exact(&mut count_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let n = f32::from_le_bytes(count_bytes) as usize;
        let mut points = Vec::with_capacity(n);
        for _ in 0..n {
            let mut coords = Vec::with_capacity(dim);
            for _ in 0..dim {
                let mut buf = [0u8; 4];
                reader.read_exact(&mut buf)?;
                coords.push(f32::from_le_bytes(buf) as f64);
            }
            let mut val_buf = [0u8; 4];
            reader.read_exact(&mut val_buf)?;
            let val = f32::from_le_bytes(val_buf) as f64;
            points.push((nalgebra::DVector::from_vec(coords), val));
        }
        trajectories.push(Trajectory { points });
    }
    Ok(trajectories)
}

/// A debugging dump of every field of every intersection, using
/// `serde_json` the way `#[derive(Serialize, Deserialize)]` union-find
/// nodes elsewhere in this crate are dumped.
pub fn dump_intersections_json<W: Write>(
    writer: W,
    intersections: &BTreeMap<SimplexId, Intersection>,
) -> serde_json::Result<()> {
    let wire: Vec<WireIntersection> = intersections.values().map(WireIntersection::from).collect();
    serde_json::to_writer_pretty(writer, &wire)
}

/// Writes one connected component per line, as space-separated canonical
/// simplex ids (see [`SimplexId::to_text`]); lines are rank-ordered by the
/// component's root id, matching the canonical total order the rest of the
/// pipeline uses everywhere else.
pub fn dump_components<W: Write>(
    writer: &mut W,
    components: &BTreeMap<SimplexId, Vec<SimplexId>>,
) -> io::Result<()> {
    for members in components.values() {
        let line = members.iter().map(SimplexId::to_text).collect::<Vec<_>>().join(" ");
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn trajectories_round_trip_through_the_binary_format() {
        let trajectories = vec![
            Trajectory {
                points: vec![
                    (DVector::from_vec(vec![1.0, 2.0, 0.0]), 5.0),
                    (DVector::from_vec(vec![1.5, 2.5, 1.0]), 6.0),
                ],
            },
            Trajectory {
                points: vec![(DVector::from_vec(vec![0.0, 0.0, 0.0]), 1.0)],
            },
        ];

        let mut buf = Vec::new();
        write_trajectories(&mut buf, &trajectories).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = read_trajectories(&mut cursor, 3).unwrap();

        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].len(), 2);
        assert_eq!(read_back[1].len(), 1);
        assert!((read_back[0].points[0].1 - 5.0).abs() < 1e-5);
    }

    #[test]
    fn dump_components_writes_one_line_per_component() {
        let a = SimplexId::from_vertices(2, vec![vec![0, 0], vec![1, 0]]);
        let b = SimplexId::from_vertices(2, vec![vec![1, 0], vec![1, 1]]);
        let c = SimplexId::from_vertices(2, vec![vec![5, 5], vec![6, 5]]);

        let mut components = BTreeMap::new();
        components.insert(a.clone(), vec![a.clone(), b.clone()]);
        components.insert(c.clone(), vec![c.clone()]);

        let mut buf = Vec::new();
        dump_components(&mut buf, &components).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("{} {}", a.to_text(), b.to_text()));
        assert_eq!(lines[1], c.to_text());
    }
}

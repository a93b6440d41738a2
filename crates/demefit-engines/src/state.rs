//! Checkpointing of the optimizer population.
//!
//! A long fit is restartable: the driver's population of points and their
//! costs can be written to a plain-text state file and fed back into a new
//! run, which also lets several chains exchange starting points. The format
//! is line oriented: a header with the point count and dimension, the free
//! parameter names, then one `cost x1 .. xn` line per point. Lines starting
//! with `#` are comments.

use demefit_error::{DemefitResult, demefit_bail, demefit_err, ensure};
use std::io::{BufRead, Write};

#[derive(Clone, Debug, PartialEq)]
pub struct StatePoint {
    pub cost: f64,
    pub x: Vec<f64>,
}

/// A snapshot of an optimizer population.
#[derive(Clone, Debug, PartialEq)]
pub struct OptState {
    names: Vec<String>,
    points: Vec<StatePoint>,
}

impl OptState {
    pub fn new(names: Vec<String>, points: Vec<StatePoint>) -> DemefitResult<Self> {
        ensure!(!names.is_empty(), InvalidConfig: "state needs at least one parameter");
        for p in &points {
            ensure!(
                p.x.len() == names.len(),
                InvalidConfig: "state point has {} coordinates, expected {}", p.x.len(), names.len()
            );
        }
        Ok(OptState { names, points })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn points(&self) -> &[StatePoint] {
        &self.points
    }

    pub fn dim(&self) -> usize {
        self.names.len()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The lowest-cost point in the snapshot.
    pub fn best(&self) -> Option<&StatePoint> {
        self.points
            .iter()
            .min_by(|a, b| a.cost.total_cmp(&b.cost))
    }

    pub fn write_to(&self, w: &mut dyn Write) -> DemefitResult<()> {
        writeln!(w, "{} {}", self.points.len(), self.names.len())?;
        writeln!(w, "{}", self.names.join(" "))?;
        for p in &self.points {
            write!(w, "{:.17e}", p.cost)?;
            for v in &p.x {
                write!(w, " {:.17e}", v)?;
            }
            writeln!(w)?;
        }
        Ok(())
    }

    pub fn read_from(r: &mut dyn BufRead) -> DemefitResult<OptState> {
        let mut lines = Vec::new();
        let mut buf = String::new();
        loop {
            buf.clear();
            if r.read_line(&mut buf)? == 0 {
                break;
            }
            let line = buf.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            lines.push(line.to_string());
        }

        let mut lines = lines.into_iter();
        let header = lines
            .next()
            .ok_or_else(|| demefit_err!(Parse: "state file is empty"))?;
        let mut fields = header.split_whitespace();
        let npoints = parse_count(fields.next(), "point count")?;
        let dim = parse_count(fields.next(), "dimension")?;
        if fields.next().is_some() {
            demefit_bail!(Parse: "trailing fields in state header");
        }

        let names_line = lines
            .next()
            .ok_or_else(|| demefit_err!(Parse: "state file has no names line"))?;
        let names: Vec<String> = names_line.split_whitespace().map(str::to_string).collect();
        ensure!(
            names.len() == dim,
            Parse: "state names {} do not match dimension {}", names.len(), dim
        );

        let mut points = Vec::with_capacity(npoints);
        for line in lines {
            let values: Vec<f64> = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f64>()
                        .map_err(|_| demefit_err!(Parse: "bad number \"{}\" in state file", tok))
                })
                .collect::<DemefitResult<_>>()?;
            ensure!(
                values.len() == dim + 1,
                Parse: "state point has {} fields, expected {}", values.len(), dim + 1
            );
            points.push(StatePoint {
                cost: values[0],
                x: values[1..].to_vec(),
            });
        }
        ensure!(
            points.len() == npoints,
            Parse: "state file promised {} points but carries {}", npoints, points.len()
        );

        OptState::new(names, points)
    }
}

fn parse_count(field: Option<&str>, what: &str) -> DemefitResult<usize> {
    field
        .and_then(|tok| tok.parse::<usize>().ok())
        .ok_or_else(|| demefit_err!(Parse: "bad {} in state header", what))
}

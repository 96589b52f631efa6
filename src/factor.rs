use anyhow::bail;
use polars::prelude::*;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// A categorical variable with an explicit order of its levels.
///
/// The first level is the *reference* level, the baseline against which the
/// other levels are compared in downstream differential expression models.
/// Values are stored as codes into `levels`; a value that is not one of the
/// levels is missing (`None`).
///
/// ```rust
/// use txmeta::factor::Factor;
///
/// let mut condition = Factor::new("condition", &[Some("trt"), Some("untrt"), Some("trt")]);
/// assert_eq!(condition.levels(), &["trt", "untrt"]);
///
/// condition.relevel("untrt").unwrap();
/// assert_eq!(condition.levels(), &["untrt", "trt"]);
/// assert_eq!(condition.values(), vec![Some("trt"), Some("untrt"), Some("trt")]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Factor {
    name: String,
    levels: Vec<String>,
    codes: Vec<Option<u32>>,
}

impl Factor {
    /// Creates a factor from the given values. The levels are the distinct
    /// non-missing values in lexicographic order.
    pub fn new<T: AsRef<str>>(name: &str, values: &[Option<T>]) -> Factor {
        let levels: Vec<String> = values
            .iter()
            .flatten()
            .map(|v| v.as_ref().to_string())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();

        let index: HashMap<&str, u32> = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i as u32))
            .collect();

        let codes = values
            .iter()
            .map(|v| v.as_ref().and_then(|v| index.get(v.as_ref()).copied()))
            .collect();

        Factor {
            name: name.to_string(),
            levels,
            codes,
        }
    }

    /// Creates a factor whose levels are given explicitly, in order.
    /// Values that are not among the levels become missing values.
    pub fn with_levels<T: AsRef<str>, L: AsRef<str>>(
        name: &str,
        values: &[Option<T>],
        levels: &[L],
    ) -> anyhow::Result<Factor> {
        let levels: Vec<String> = levels.iter().map(|l| l.as_ref().to_string()).collect();

        let mut index: HashMap<&str, u32> = HashMap::with_capacity(levels.len());
        for (i, l) in levels.iter().enumerate() {
            if index.insert(l.as_str(), i as u32).is_some() {
                bail!("The level {:?} of factor {:?} is duplicated.", l, name)
            }
        }

        let mut n_dropped = 0usize;
        let codes = values
            .iter()
            .map(|v| match v {
                Some(v) => {
                    let code = index.get(v.as_ref()).copied();
                    if code.is_none() {
                        n_dropped += 1;
                    }
                    code
                }
                None => None,
            })
            .collect();

        if n_dropped > 0 {
            warn!(
                "{} value(s) of factor {:?} are not among its levels {:?} and were set to missing.",
                n_dropped, name, levels
            );
        }

        Ok(Factor {
            name: name.to_string(),
            levels,
            codes,
        })
    }

    /// Creates a factor from a string (or categorical) [Series].
    pub fn from_series(s: &Series, levels: Option<&[String]>) -> anyhow::Result<Factor> {
        let s = s.cast(&DataType::String)?;
        let values: Vec<Option<&str>> = s.str()?.into_iter().collect();
        match levels {
            Some(levels) => Factor::with_levels(s.name(), &values, levels),
            None => Ok(Factor::new(s.name(), &values)),
        }
    }

    /// Makes `reference` the first level, keeping the relative order of the
    /// other levels. The values themselves do not change. Releveling to the level
    /// that already is the reference leaves the factor untouched.
    pub fn relevel(&mut self, reference: &str) -> anyhow::Result<()> {
        let Some(pos) = self.levels.iter().position(|l| l == reference) else {
            bail!(
                "{:?} is not a level of factor {:?}; the levels are {:?}.",
                reference,
                self.name,
                self.levels
            )
        };
        if pos == 0 {
            return Ok(());
        }

        // the old code of every level moved by the rotation
        let remap: Vec<u32> = (0..self.levels.len() as u32)
            .map(|c| match (c as usize).cmp(&pos) {
                std::cmp::Ordering::Less => c + 1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => c,
            })
            .collect();

        self.levels[..=pos].rotate_right(1);
        for c in self.codes.iter_mut().flatten() {
            *c = remap[*c as usize];
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// The reference (first) level, if there is any level at all.
    pub fn reference(&self) -> Option<&str> {
        self.levels.first().map(|l| l.as_str())
    }

    pub fn codes(&self) -> &[Option<u32>] {
        &self.codes
    }

    pub fn values(&self) -> Vec<Option<&str>> {
        self.codes
            .iter()
            .map(|c| c.map(|c| self.levels[c as usize].as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Keeps the values at the given positions; the levels are unchanged.
    pub fn take(&self, rows: &[usize]) -> Factor {
        Factor {
            name: self.name.clone(),
            levels: self.levels.clone(),
            codes: rows.iter().map(|&r| self.codes[r]).collect(),
        }
    }

    pub fn to_series(&self) -> Series {
        Series::new(&self.name, self.values())
    }
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: Levels: {}", self.name, self.levels.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_levels() {
        let f = Factor::new(
            "line",
            &[Some("N61311"), Some("N052611"), None, Some("N61311")],
        );
        assert_eq!(f.levels(), &["N052611", "N61311"]);
        assert_eq!(f.codes(), &[Some(1), Some(0), None, Some(1)]);
        assert_eq!(f.reference(), Some("N052611"));

        let f = Factor::with_levels(
            "condition",
            &[Some("untrt"), Some("trt"), Some("dex")],
            &["untrt", "trt"],
        )
        .unwrap();
        assert_eq!(f.values(), vec![Some("untrt"), Some("trt"), None]);

        assert!(Factor::with_levels("condition", &[Some("a")], &["a", "a"]).is_err());
    }

    #[test]
    fn test_relevel() {
        let values = [Some("b"), Some("c"), Some("a"), None, Some("c")];
        let mut f = Factor::new("x", &values);
        assert_eq!(f.levels(), &["a", "b", "c"]);

        f.relevel("c").unwrap();
        assert_eq!(f.levels(), &["c", "a", "b"]);
        assert_eq!(f.values(), values.to_vec());
        assert_eq!(f.codes(), &[Some(2), Some(0), Some(1), None, Some(0)]);

        // releveling is idempotent
        let once = f.clone();
        f.relevel("c").unwrap();
        assert_eq!(f, once);

        assert!(f.relevel("d").is_err());
    }

    #[test]
    fn test_from_series() {
        let s = Series::new("condition", &["trt", "untrt", "trt"]);
        let f = Factor::from_series(&s, Some(&[String::from("untrt"), String::from("trt")][..]))
            .unwrap();
        assert_eq!(f.reference(), Some("untrt"));
        assert_eq!(f.codes(), &[Some(1), Some(0), Some(1)]);
        assert_eq!(f.take(&[1]).values(), vec![Some("untrt")]);
        assert!(f.to_series().equals(&s));
    }
}

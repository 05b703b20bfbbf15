//! Range-set helpers for cpuset lists
//!
//! cpusets are comma-delimited ranges, e.g. `"1,2-3,4"`.

/// One token of a cpuset list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Single(u32),
    Range(u32, u32),
}

impl Span {
    fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        match token.split_once('-') {
            Some((a, b)) => {
                let a: u32 = a.trim().parse().ok()?;
                let b: u32 = b.trim().parse().ok()?;
                Some(Span::Range(a.min(b), a.max(b)))
            }
            None => token.parse().ok().map(Span::Single),
        }
    }

    fn contains(self, cpu: u32) -> bool {
        match self {
            Span::Single(a) => cpu == a,
            Span::Range(a, b) => (a..=b).contains(&cpu),
        }
    }

    fn len(self) -> u32 {
        match self {
            Span::Single(_) => 1,
            Span::Range(a, b) => (b - a).saturating_add(1),
        }
    }
}

fn spans(set: &str) -> impl Iterator<Item = Span> + '_ {
    set.split(',').filter_map(Span::parse)
}

/// Whether `cpu` is a member of `set`
pub fn contains(cpu: u32, set: &str) -> bool {
    spans(set).any(|span| span.contains(cpu))
}

/// Number of CPUs listed in `set`; unparseable tokens count as zero
pub fn cardinality(set: &str) -> u32 {
    spans(set).map(Span::len).fold(0, u32::saturating_add)
}

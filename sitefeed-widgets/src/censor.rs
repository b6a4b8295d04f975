//! Masking of banned terms before a message is stored or shown.
//!
//! Every pattern is a run of character classes admitting a letter together with its digit and
//! punctuation look-alikes, matched case-insensitively. Patterns run in order over the text as
//! masked so far, and each one masks only its first match in that pass.

use std::sync::LazyLock;

use regex::{Captures, Regex, RegexBuilder};

pub const MASK: char = '*';

const BANNED_PATTERNS: &[&str] = &[
    r"n[i1!|][g9q][g9q][e3][r2]",
    r"n[i1!|]g[g9q][a@4][r2]",
    r"c[h][i1!|][n][k]",
    r"g[o0][o0][k]",
    r"k[i1!|][k][e3]",
    r"c[o0][o0][n]",
    r"r[a@4][g9q][h][e3][a@4][d]",
    r"s[a@4][n][d][n][i1!|][g9q][g9q][e3][r2]",
    r"w[o0][p]",
    r"j[a@4][p]",
    r"p[a@4][k][i1!|]",
    r"z[i1!|][p][p][e3][r][h][e3][a@4][d]",
    r"g[r][o0][i1!|][d]",
    r"f[a@4][g9q][g9q][o0][t7]",
    r"f[a@4][g9q][g9q][o0][t7][s5$]?",
    r"t[r][a@4][n][n][y]",
    r"t[r][a@4][n][n][i1!|]",
    r"s[h][e3][m][a@4][l1!|][e3]",
    r"h[o0][m][o0]",
    r"h[o0][m][o0][s5$]",
    r"r[e3][t7][a@4][r][d]",
    r"r[e3][t7][a@4][r][d][s5$]?",
    r"s[p][a@4][z]",
    r"m[o0][n][g9q]",
    r"k[a@4][f][f][i1!|]r",
    r"h[e3][a@4][t7][h][e3][n]",
    r"i[n][f][i1!|][d][e3][l]",
    r"t[e3][r][r][o0][r][i1!|][s5$][t7]",
    r"i[s5$][l][a@4][m][i1!|][s5$][t7]",
    r"c[a@4][m][e3][l]\s*j[o0][c][k]",
    r"u[n][c][i1!|][v][i1!|][l][i1!|][z][e3][d]",
    r"s[a@4][v][a@4][g9q][e3][s5$]?",
    r"n[i1!|][g9q][g9q][e3][r2]",
    r"f[a@4][g9q][g9q][o0][t7]",
    r"s[h][e3][m][a@4][l1!|][e3]",
    r"t[r][a@4][n][n][y]",
    r"c[u*][n][t]",
    r"b[i1!|][t7][c][h]",
    r"d[i1!|][c][k]",
    r"p[e3][n][i1!|][s]",
    r"p[u*][s][s][y]",
    r"j[e3][r][k]",
    r"w[h][o0][r][e]",
    r"s[l1!|][u*][t]",
    r"b[i1!|][m][b][o0]",
    r"g[o0][l][d][d][i1!|][g9q][g9q][e3][r]",
    r"d[u*][m][b][b][l][o0][n][d][e3]",
];

static DEFAULT_CENSOR: LazyLock<Censor> = LazyLock::new(|| {
    Censor::new(BANNED_PATTERNS).expect("built-in banned patterns are valid")
});

/// Masks banned terms with the built-in pattern list.
pub fn censor(text: &str) -> String {
    DEFAULT_CENSOR.censor(text)
}

#[derive(Clone, Debug)]
pub struct Censor {
    patterns: Vec<Regex>,
}

impl Default for Censor {
    fn default() -> Self {
        DEFAULT_CENSOR.clone()
    }
}

impl Censor {
    pub fn new<I>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| RegexBuilder::new(pattern.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Replaces each matched span with as many [`MASK`] characters as it has characters.
    pub fn censor(&self, text: &str) -> String {
        let mut censored = text.to_owned();
        for pattern in &self.patterns {
            censored = pattern
                .replace(&censored, |caps: &Captures<'_>| {
                    std::iter::repeat(MASK).take(caps[0].chars().count()).collect::<String>()
                })
                .into_owned();
        }
        censored
    }
}

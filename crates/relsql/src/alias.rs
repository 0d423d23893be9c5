/// Hands out `"<prefix>0"`, `"<prefix>1"`, … for one compile call.
#[derive(Debug, Clone)]
pub struct AliasGenerator {
    prefix: String,
    next: usize,
}

impl AliasGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    pub fn next_alias(&mut self) -> String {
        let alias = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_zero() {
        let mut aliases = AliasGenerator::new("S");
        assert_eq!(aliases.next_alias(), "S0");
        assert_eq!(aliases.next_alias(), "S1");
    }
}

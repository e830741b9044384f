use pest::{iterators::Pairs, Parser};
use pest_derive::Parser;

// Link to the grammar file
#[derive(Parser)]
#[grammar = "lang/grammar.pest"]
pub struct PlingoParser;

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("Pest parsing error: {0}")]
    Pest(#[from] Box<pest::error::Error<Rule>>),
}

// Implement From so `?` can convert the original error to the Boxed version
impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ParseError::Pest(Box::new(err))
    }
}

/// Parses a logic program according to the grammar rules.
pub fn parse_program_pairs(input: &str) -> Result<Pairs<'_, Rule>, ParseError> {
    Ok(PlingoParser::parse(Rule::program, input)?)
}

/// Parses a single term, e.g. a query atom given on the command line.
pub fn parse_term_pairs(input: &str) -> Result<Pairs<'_, Rule>, ParseError> {
    Ok(PlingoParser::parse(Rule::term_only, input)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_parses(kind: Rule, input: &str) {
        match PlingoParser::parse(kind, input) {
            Ok(_) => (),
            Err(e) => panic!("Failed to parse input:\n{}\nError: {}", input, e),
        }
    }

    fn assert_fails(kind: Rule, input: &str) {
        match PlingoParser::parse(kind, input) {
            Ok(pairs) => panic!(
                "Expected parse to fail, but it succeeded. Parsed:\n{:#?}",
                pairs
            ),
            Err(_) => (),
        }
    }

    #[test]
    fn test_parse_empty() {
        assert_parses(Rule::program, "");
        assert_parses(Rule::program, " \n\n");
        assert_parses(Rule::program, "% comment only");
        assert_parses(Rule::program, "%* block\n comment *%");
    }

    #[test]
    fn test_parse_identifier() {
        assert_parses(Rule::test_identifier, "my_pred");
        assert_parses(Rule::test_identifier, "_plingo_h");
        assert_parses(Rule::test_identifier, "a'");
        assert_fails(Rule::test_identifier, "Upper");
        assert_fails(Rule::test_identifier, "1abc");
    }

    #[test]
    fn test_parse_variable() {
        assert_parses(Rule::test_variable, "X");
        assert_parses(Rule::test_variable, "_Y1");
        assert_fails(Rule::test_variable, "x");
    }

    #[test]
    fn test_parse_terms() {
        assert_parses(Rule::term_only, "a");
        assert_parses(Rule::term_only, "-3");
        assert_parses(Rule::term_only, "\"0.3\"");
        assert_parses(Rule::term_only, "\"esc\\\"aped\"");
        assert_parses(Rule::term_only, "f(X, g(1), (a, b))");
        assert_parses(Rule::term_only, "(a,)");
        assert_parses(Rule::term_only, "()");
        assert_fails(Rule::term_only, "f(");
        assert_fails(Rule::term_only, "a b");
    }

    #[test]
    fn test_parse_rules() {
        assert_parses(Rule::program, "a. b :- a.");
        assert_parses(Rule::program, ":- a, not b.");
        assert_parses(Rule::program, "a :- not not b.");
        assert_parses(Rule::program, "{ a; b : c } 1.");
        assert_parses(Rule::program, "1 <= { a; b } <= 2 :- c.");
        assert_parses(Rule::program, "h :- X = 1, X != 2, p(X).");
        assert_parses(Rule::program, "h :- not { a; b } = 1.");
        assert_fails(Rule::program, "a");
        assert_fails(Rule::program, "a :- .");
    }

    #[test]
    fn test_parse_weak_constraints() {
        assert_parses(Rule::program, ":~ a. [1@0]");
        assert_parses(Rule::program, ":~ a(X), b. [-2@1, X, tag]");
        assert_parses(Rule::program, ":~ . [1]");
        assert_fails(Rule::program, ":~ a. []");
    }

    #[test]
    fn test_parse_theory_atoms() {
        assert_parses(Rule::program, "&weight(\"0.5\") :- a.");
        assert_parses(Rule::program, "a :- b, &weight(2).");
        assert_parses(Rule::program, "&query(a(X)) :- d(X).");
        assert_parses(Rule::program, "&evidence(a, false).");
        assert_parses(Rule::program, "&random(r) { h(D, Y) : v(Y) } :- d(D).");
        assert_parses(Rule::program, "&pr { h(d, y) } = \"1/4\" :- c.");
        assert_parses(Rule::program, "&obs { h(d, y) } = true.");
        assert_parses(Rule::program, "&do { h(d, y) }.");
    }

    #[test]
    fn test_parse_directives() {
        assert_parses(Rule::program, "#show.");
        assert_parses(Rule::program, "#show a/2.");
        assert_parses(Rule::program, "#external e.");
        assert_parses(Rule::program, "#const n = 3.");
        assert_parses(Rule::program, "#program base.");
        assert_fails(Rule::program, "#show a/.");
    }
}

//! Line lexer using logos

use logos::Logos;

use super::error::{ScriptError, ScriptResult};
use super::token::{Token, TokenKind};
use crate::common::Span;

/// Split one preprocessed line into tokens, ending with [`TokenKind::Eol`]
pub fn tokenize(line: &str) -> ScriptResult<Vec<Token>> {
    let mut lexer = TokenKind::lexer(line);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let span = Span::new(span.start, span.end);
        match result {
            Ok(kind) => tokens.push(Token::new(kind, span)),
            Err(()) => {
                return Err(ScriptError::lexer(
                    format!("unexpected character '{}'", lexer.slice()),
                    span,
                ));
            }
        }
    }

    tokens.push(Token::new(TokenKind::Eol, Span::new(line.len(), line.len())));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asar::script::token::Number;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize(line).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_instruction_line() {
        assert_eq!(
            kinds("lda.w #$1234"),
            vec![
                TokenKind::Identifier("lda".into()),
                TokenKind::Dot,
                TokenKind::Identifier("w".into()),
                TokenKind::Hash,
                TokenKind::Number(Number { value: 0x1234, width: 2 }),
                TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn test_indirect_operand() {
        assert_eq!(
            kinds("($10,s),y"),
            vec![
                TokenKind::LParen,
                TokenKind::Number(Number { value: 0x10, width: 1 }),
                TokenKind::Comma,
                TokenKind::Identifier("s".into()),
                TokenKind::RParen,
                TokenKind::Comma,
                TokenKind::Identifier("y".into()),
                TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn test_strings_and_chars() {
        assert_eq!(
            kinds("db \"HI\",'!'"),
            vec![
                TokenKind::Identifier("db".into()),
                TokenKind::String("HI".into()),
                TokenKind::Comma,
                TokenKind::Number(Number { value: u32::from(b'!'), width: 1 }),
                TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a<<2>>1|%11&3"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::LtLt,
                TokenKind::Number(Number { value: 2, width: 1 }),
                TokenKind::GtGt,
                TokenKind::Number(Number { value: 1, width: 1 }),
                TokenKind::Pipe,
                TokenKind::Number(Number { value: 3, width: 1 }),
                TokenKind::Amp,
                TokenKind::Number(Number { value: 3, width: 1 }),
                TokenKind::Eol,
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("lda @foo").unwrap_err();
        assert_eq!(err.span, Span::new(4, 5));
        assert!(err.message.contains('@'));
    }

    #[test]
    fn test_empty_line_has_eol() {
        let tokens = tokenize("").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].span, Span::new(0, 0));
    }
}

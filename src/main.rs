use std::fs;
use std::path::PathBuf;

use clap::Parser as ClapParser;

use php_front::ast::sexpr::SExprFormatter;
use php_front::lexer::token::TokenKind;
use php_front::lexer::Lexer;
use php_front::line_index::LineIndex;
use php_front::{parse, Features};

#[derive(ClapParser)]
struct Cli {
    file: PathBuf,

    /// Dump the token stream instead of parsing.
    #[arg(long)]
    tokens: bool,

    /// Print the tree as s-expressions.
    #[arg(long)]
    sexpr: bool,

    /// Recognize `<?` open tags.
    #[arg(long)]
    short_tags: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let source = fs::read(&cli.file)?;
    let features = Features {
        short_open_tags: cli.short_tags,
    };

    if cli.tokens {
        let mut lexer = Lexer::with_features(&source, features);
        loop {
            let token = lexer.next_token();
            println!(
                "{:>5}..{:<5} {:>4} {}",
                token.span.start,
                token.span.end,
                token.kind.id(),
                token.kind.name()
            );
            if token.kind == TokenKind::End {
                break;
            }
        }
        return Ok(());
    }

    let result = parse(&source, features);

    let index = LineIndex::new(&source);
    for diag in &result.diagnostics {
        let (line, col) = index.line_col(diag.span.start.min(source.len()));
        eprintln!(
            "{}:{}:{}: {:?}: {}",
            cli.file.display(),
            line,
            col,
            diag.severity,
            diag.message
        );
    }

    if cli.sexpr {
        println!("{}", SExprFormatter::new(&result.ast).format(result.root));
    } else {
        println!("{:#?}", result.ast.stmt(result.root));
    }
    Ok(())
}

use tachiyomi_reader::backend::config::AppConfig;
use tachiyomi_reader::backend::loader::{HttpPageLoader, PageLoader};
use tachiyomi_reader::backend::mangadex::MangaDex;
use tachiyomi_reader::backend::preloader::Preloader;
use tachiyomi_reader::backend::progress::ProgressStore;
use tachiyomi_reader::ui::indicator;
use tachiyomi_reader::ui::reader::ReaderSession;

use std::error::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

const USAGE: &str = "usage: tachiyomi-reader <manga-id> <chapter-id> [--data-saver]";
const HELP: &str = "n: next  p: previous  g <page>: go to  home/end  s: cache stats  q: quit";

#[derive(Debug, PartialEq)]
enum Command {
    Next,
    Prev,
    GoTo(usize),
    First,
    Last,
    Stats,
    Quit,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "n" | "d" => Command::Next,
        "p" | "a" => Command::Prev,
        "home" => Command::First,
        "end" => Command::Last,
        "s" => Command::Stats,
        "q" => Command::Quit,
        "h" | "?" => Command::Help,
        "g" => {
            // Pages are numbered from 1 on screen.
            let page: usize = words.next()?.parse().ok()?;
            Command::GoTo(page.checked_sub(1)?)
        }
        _ => return None,
    };
    Some(command)
}

fn print_page<L: PageLoader>(session: &ReaderSession<L>) {
    println!(
        "{} | Ch. {} | page {}/{} [{:?}] {}",
        session.manga_title(),
        session.chapter().chapter.chapter,
        session.current_page() + 1,
        session.total_pages(),
        session.current_state(),
        session.current_url().unwrap_or("")
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let data_saver = args.iter().any(|arg| arg == "--data-saver");
    let ids: Vec<&str> = args
        .iter()
        .filter(|arg| !arg.starts_with("--"))
        .map(String::as_str)
        .collect();
    let &[manga_id, chapter_id] = ids.as_slice() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = AppConfig::load();
    let source = MangaDex::new(&config.api_base_url)?;

    let manga_title = match source.get_manga_title(manga_id).await {
        Ok(title) => title,
        Err(e) => {
            log::warn!("Could not fetch manga title: {}", e);
            manga_id.to_string()
        }
    };
    let chapter = source
        .get_chapter_pages(chapter_id, config.data_saver || data_saver)
        .await?;
    if chapter.pages.is_empty() {
        eprintln!("Chapter {} has no pages", chapter_id);
        return Ok(());
    }

    let loader = HttpPageLoader::with_client(source.client().clone());
    let preloader = Preloader::new(config.preload_config(), loader)?;
    let mut changes = preloader.subscribe();
    let mut session = ReaderSession::open(
        manga_id,
        &manga_title,
        chapter,
        preloader,
        ProgressStore::open_default(),
    );

    println!("{HELP}");
    print_page(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_status = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let Some(command) = parse_command(&line) else {
                    println!("{HELP}");
                    continue;
                };

                let moved = match command {
                    Command::Quit => break,
                    Command::Help => {
                        println!("{HELP}");
                        continue;
                    }
                    Command::Stats => {
                        let line = indicator::detailed(&session.stats());
                        println!("{}", line.unwrap_or_else(|| "Page cache empty".to_string()));
                        continue;
                    }
                    Command::Next => session.next_page(),
                    Command::Prev => session.prev_page(),
                    Command::GoTo(page) => session.go_to(page),
                    Command::First => session.first_page(),
                    Command::Last => session.last_page(),
                };

                if moved {
                    print_page(&session);
                } else {
                    println!("No page there");
                }
            }

            Ok(()) = changes.changed() => {
                let status = session.status_line();
                if status != last_status {
                    if let Some(status) = &status {
                        log::info!("Page cache {}", status);
                    }
                    last_status = status;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("n"), Some(Command::Next));
        assert_eq!(parse_command("  p  "), Some(Command::Prev));
        assert_eq!(parse_command("g 12"), Some(Command::GoTo(11)));
        assert_eq!(parse_command("end"), Some(Command::Last));
        assert_eq!(parse_command("q"), Some(Command::Quit));
    }

    #[test]
    fn test_invalid_commands() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("g"), None);
        assert_eq!(parse_command("g 0"), None);
        assert_eq!(parse_command("g two"), None);
        assert_eq!(parse_command("jump"), None);
    }
}

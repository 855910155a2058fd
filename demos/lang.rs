//! The language command surface: `set_lang <code>`, `lang_now`,
//! `lang_list`.

use spyglass_ping::lang;

fn main() {
    let args = std::env::args().collect::<Vec<_>>();
    match args.get(1).map(String::as_str) {
        Some("set_lang") => match args.get(2) {
            Some(code) => println!("{}", lang::set_language(code)),
            None => println!("Language?"),
        },
        Some("lang_now") => println!("Language: {}.", lang::current_language()),
        Some("lang_list") => println!("Language List:\n{}", lang::language_list().join("\n")),
        _ => eprintln!("usage: lang <set_lang <code> | lang_now | lang_list>"),
    }
}

//! Interactive picker, used when `wtd` is invoked with no specifier so
//! the user can fuzzy-pick among known worktrees. Grounded on
//! `skim`'s use in worktrunk for exactly this kind of worktree picker.

#[cfg(feature = "picker")]
pub fn pick(candidates: Vec<String>) -> Option<String> {
    use skim::prelude::*;
    use std::io::Cursor;

    if candidates.is_empty() {
        return None;
    }

    let options = SkimOptionsBuilder::default()
        .height(String::from("40%"))
        .multi(false)
        .build()
        .ok()?;

    let input = candidates.join("\n");
    let item_reader = SkimItemReader::default();
    let items = item_reader.of_bufread(Cursor::new(input));

    let selected = Skim::run_with(&options, Some(items))?;
    if selected.is_abort {
        return None;
    }
    selected
        .selected_items
        .first()
        .map(|item| item.output().to_string())
}

#[cfg(not(feature = "picker"))]
pub fn pick(_candidates: Vec<String>) -> Option<String> {
    None
}

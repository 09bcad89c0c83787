mod history;

pub use history::HistoryEntry;

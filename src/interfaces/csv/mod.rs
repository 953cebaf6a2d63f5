//! CSV adapters for the command-line front end.

pub mod ledger_reader;
pub mod request_reader;
pub mod writer;

/// Reader settings shared by every CSV input: fields are trimmed and rows
/// may omit trailing columns.
pub(crate) fn reader_for<R: std::io::Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source)
}

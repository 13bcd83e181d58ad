//! Replaces the reference sequence dictionary (`@SQ` list) wholesale, either
//! from an explicit list of records or by reading another SAM file's header.
//!
//! Grounded on `simple_filters.cpp`'s `replace_reference_sequence_dictionary`/
//! `replace_reference_sequence_dictionary_from_sam_file`.

use std::{collections::HashSet, fs::File, io::BufReader, sync::Arc};

use crate::{
    error::{Error, ParseError, Result},
    header::{Header, Record},
    io::line_reader::LineReader,
    record::Alignment,
};

use super::{AlignmentFilter, HeaderFilter};

/// Replaces `header.sq` with `dict`, dropping any alignment whose `RNAME`
/// isn't one of the new dictionary's `SN` values.
///
/// If the header's sort order is `coordinate`, downgrades it to `unknown`
/// unless every old `@SQ` entry that still appears in `dict` appears in a
/// strictly increasing position — i.e. the new dictionary is consistent with
/// records already sorted against the old one.
pub fn replace_reference_sequence_dictionary(dict: Vec<Record>) -> HeaderFilter {
    Box::new(move |header: &mut Header| {
        if header.sort_order() == "coordinate" {
            let mut previous_pos: i64 = -1;
            for entry in &dict {
                let sn = entry.get("SN").cloned().ok_or(Error::Parse(ParseError::MissingSn))?;
                if let Some(pos) = header.sq.iter().position(|old| old.get("SN") == Some(&sn)) {
                    let pos = pos as i64;
                    if pos > previous_pos {
                        previous_pos = pos;
                    } else {
                        header.set_sort_order("unknown");
                        break;
                    }
                }
            }
        }

        let mut dict_table: HashSet<String> = HashSet::with_capacity(dict.len());
        for entry in &dict {
            let sn = entry.get("SN").cloned().ok_or(Error::Parse(ParseError::MissingSn))?;
            dict_table.insert(sn);
        }
        header.sq = dict;

        Ok(Some(Arc::new(move |aln: &mut Alignment| {
            dict_table.contains(aln.rname.as_str())
        }) as AlignmentFilter))
    })
}

/// Same as [`replace_reference_sequence_dictionary`], but reads the new
/// dictionary from another SAM file's header.
pub fn replace_reference_sequence_dictionary_from_sam_file(sam_file: &str) -> Result<HeaderFilter> {
    let file = File::open(sam_file)?;
    let mut reader = LineReader::new(BufReader::new(file));
    let other = Header::read(&mut reader)?;
    Ok(replace_reference_sequence_dictionary(other.sq))
}

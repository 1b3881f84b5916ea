//! Re-projection of language-service results between coordinate spaces.
//!
//! Every function consumes its input and returns a copy whose range and
//! position fields were translated; all other fields are carried over as-is.

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    CodeAction, ColorInformation, ColorPresentation, CompletionItem, CompletionList,
    CompletionTextEdit, Diagnostic, DiagnosticRelatedInformation, DocumentChanges,
    DocumentSymbol, FoldingRange, Hover, InsertReplaceEdit, Location, LocationLink, OneOf,
    Position, Range, SelectionRange, SymbolInformation, TextDocumentEdit, TextEdit, Url,
    WorkspaceEdit,
};

use super::DocumentMapper;

pub fn map_range_to_original(mapper: &dyn DocumentMapper, range: Range) -> Range {
    mapper.range_to_original(range)
}

pub fn map_range_to_generated(mapper: &dyn DocumentMapper, range: Range) -> Range {
    mapper.range_to_generated(range)
}

fn is_local(mapper: &dyn DocumentMapper, uri: &Url) -> bool {
    mapper.generated_url() == Some(uri)
}

pub fn map_hover_to_original(mapper: &dyn DocumentMapper, hover: Hover) -> Hover {
    Hover {
        range: hover.range.map(|r| mapper.range_to_original(r)),
        ..hover
    }
}

pub fn map_text_edit_to_original(mapper: &dyn DocumentMapper, edit: TextEdit) -> TextEdit {
    TextEdit {
        range: mapper.range_to_original(edit.range),
        ..edit
    }
}

fn map_text_edits_to_original(mapper: &dyn DocumentMapper, edits: Vec<TextEdit>) -> Vec<TextEdit> {
    edits
        .into_iter()
        .map(|edit| map_text_edit_to_original(mapper, edit))
        .collect()
}

pub fn map_completion_item_to_original(
    mapper: &dyn DocumentMapper,
    item: CompletionItem,
) -> CompletionItem {
    let text_edit = item.text_edit.map(|edit| match edit {
        CompletionTextEdit::Edit(edit) => {
            CompletionTextEdit::Edit(map_text_edit_to_original(mapper, edit))
        }
        CompletionTextEdit::InsertAndReplace(edit) => {
            CompletionTextEdit::InsertAndReplace(InsertReplaceEdit {
                insert: mapper.range_to_original(edit.insert),
                replace: mapper.range_to_original(edit.replace),
                ..edit
            })
        }
    });
    let additional_text_edits = item
        .additional_text_edits
        .map(|edits| map_text_edits_to_original(mapper, edits));
    CompletionItem {
        text_edit,
        additional_text_edits,
        ..item
    }
}

pub fn map_completion_item_to_generated(
    mapper: &dyn DocumentMapper,
    item: CompletionItem,
) -> CompletionItem {
    let to_generated = |edit: TextEdit| TextEdit {
        range: mapper.range_to_generated(edit.range),
        ..edit
    };
    let text_edit = item.text_edit.map(|edit| match edit {
        CompletionTextEdit::Edit(edit) => CompletionTextEdit::Edit(to_generated(edit)),
        CompletionTextEdit::InsertAndReplace(edit) => {
            CompletionTextEdit::InsertAndReplace(InsertReplaceEdit {
                insert: mapper.range_to_generated(edit.insert),
                replace: mapper.range_to_generated(edit.replace),
                ..edit
            })
        }
    });
    let additional_text_edits = item
        .additional_text_edits
        .map(|edits| edits.into_iter().map(to_generated).collect());
    CompletionItem {
        text_edit,
        additional_text_edits,
        ..item
    }
}

pub fn map_completion_list_to_original(
    mapper: &dyn DocumentMapper,
    list: CompletionList,
) -> CompletionList {
    CompletionList {
        items: list
            .items
            .into_iter()
            .map(|item| map_completion_item_to_original(mapper, item))
            .collect(),
        ..list
    }
}

fn map_related_information(
    mapper: &dyn DocumentMapper,
    related: Option<Vec<DiagnosticRelatedInformation>>,
    to_original: bool,
) -> Option<Vec<DiagnosticRelatedInformation>> {
    related.map(|infos| {
        infos
            .into_iter()
            .map(|info| {
                if !is_local(mapper, &info.location.uri) {
                    return info;
                }
                let range = if to_original {
                    mapper.range_to_original(info.location.range)
                } else {
                    mapper.range_to_generated(info.location.range)
                };
                DiagnosticRelatedInformation {
                    location: Location {
                        range,
                        ..info.location
                    },
                    ..info
                }
            })
            .collect()
    })
}

pub fn map_diagnostic_to_original(mapper: &dyn DocumentMapper, diagnostic: Diagnostic) -> Diagnostic {
    Diagnostic {
        range: mapper.range_to_original(diagnostic.range),
        related_information: map_related_information(
            mapper,
            diagnostic.related_information,
            true,
        ),
        ..diagnostic
    }
}

pub fn map_diagnostic_to_generated(
    mapper: &dyn DocumentMapper,
    diagnostic: Diagnostic,
) -> Diagnostic {
    Diagnostic {
        range: mapper.range_to_generated(diagnostic.range),
        related_information: map_related_information(
            mapper,
            diagnostic.related_information,
            false,
        ),
        ..diagnostic
    }
}

pub fn map_color_information_to_original(
    mapper: &dyn DocumentMapper,
    info: ColorInformation,
) -> ColorInformation {
    ColorInformation {
        range: mapper.range_to_original(info.range),
        ..info
    }
}

pub fn map_color_presentation_to_original(
    mapper: &dyn DocumentMapper,
    presentation: ColorPresentation,
) -> ColorPresentation {
    ColorPresentation {
        text_edit: presentation
            .text_edit
            .map(|edit| map_text_edit_to_original(mapper, edit)),
        additional_text_edits: presentation
            .additional_text_edits
            .map(|edits| map_text_edits_to_original(mapper, edits)),
        ..presentation
    }
}

pub fn map_symbol_information_to_original(
    mapper: &dyn DocumentMapper,
    symbol: SymbolInformation,
) -> SymbolInformation {
    if !is_local(mapper, &symbol.location.uri) {
        return symbol;
    }
    SymbolInformation {
        location: Location {
            range: mapper.range_to_original(symbol.location.range),
            ..symbol.location
        },
        ..symbol
    }
}

pub fn map_document_symbol_to_original(
    mapper: &dyn DocumentMapper,
    symbol: DocumentSymbol,
) -> DocumentSymbol {
    DocumentSymbol {
        range: mapper.range_to_original(symbol.range),
        selection_range: mapper.range_to_original(symbol.selection_range),
        children: symbol.children.map(|children| {
            children
                .into_iter()
                .map(|child| map_document_symbol_to_original(mapper, child))
                .collect()
        }),
        ..symbol
    }
}

/// Only links into the fragment's own document get their target remapped;
/// cross-file targets are already in the right space.
pub fn map_location_link_to_original(
    mapper: &dyn DocumentMapper,
    link: LocationLink,
) -> LocationLink {
    let local = is_local(mapper, &link.target_uri);
    LocationLink {
        origin_selection_range: link
            .origin_selection_range
            .map(|r| mapper.range_to_original(r)),
        target_range: if local {
            mapper.range_to_original(link.target_range)
        } else {
            link.target_range
        },
        target_selection_range: if local {
            mapper.range_to_original(link.target_selection_range)
        } else {
            link.target_selection_range
        },
        ..link
    }
}

fn map_workspace_edit_to_original(mapper: &dyn DocumentMapper, edit: WorkspaceEdit) -> WorkspaceEdit {
    let changes = edit.changes.map(|changes| {
        changes
            .into_iter()
            .map(|(uri, edits)| {
                let edits = if is_local(mapper, &uri) {
                    map_text_edits_to_original(mapper, edits)
                } else {
                    edits
                };
                (uri, edits)
            })
            .collect::<HashMap<_, _>>()
    });

    let document_changes = edit.document_changes.map(|changes| match changes {
        DocumentChanges::Edits(edits) => DocumentChanges::Edits(
            edits
                .into_iter()
                .map(|edit| map_text_document_edit_to_original(mapper, edit))
                .collect(),
        ),
        // Resource operations carry no ranges.
        operations @ DocumentChanges::Operations(_) => operations,
    });

    WorkspaceEdit {
        changes,
        document_changes,
        ..edit
    }
}

fn map_text_document_edit_to_original(
    mapper: &dyn DocumentMapper,
    edit: TextDocumentEdit,
) -> TextDocumentEdit {
    if !is_local(mapper, &edit.text_document.uri) {
        return edit;
    }
    TextDocumentEdit {
        edits: edit
            .edits
            .into_iter()
            .map(|edit| match edit {
                OneOf::Left(edit) => OneOf::Left(map_text_edit_to_original(mapper, edit)),
                OneOf::Right(mut annotated) => {
                    annotated.text_edit = map_text_edit_to_original(mapper, annotated.text_edit);
                    OneOf::Right(annotated)
                }
            })
            .collect(),
        ..edit
    }
}

pub fn map_code_action_to_original(mapper: &dyn DocumentMapper, action: CodeAction) -> CodeAction {
    CodeAction {
        diagnostics: action.diagnostics.map(|diagnostics| {
            diagnostics
                .into_iter()
                .map(|d| map_diagnostic_to_original(mapper, d))
                .collect()
        }),
        edit: action
            .edit
            .map(|edit| map_workspace_edit_to_original(mapper, edit)),
        ..action
    }
}

pub fn map_folding_range_to_original(
    mapper: &dyn DocumentMapper,
    folding: FoldingRange,
) -> FoldingRange {
    let start = mapper.to_original(Position::new(
        folding.start_line,
        folding.start_character.unwrap_or(0),
    ));
    let end = mapper.to_original(Position::new(
        folding.end_line,
        folding.end_character.unwrap_or(0),
    ));
    FoldingRange {
        start_line: start.line,
        start_character: folding.start_character.map(|_| start.character),
        end_line: end.line,
        end_character: folding.end_character.map(|_| end.character),
        ..folding
    }
}

pub fn map_selection_range_to_original(
    mapper: &dyn DocumentMapper,
    selection: SelectionRange,
) -> SelectionRange {
    SelectionRange {
        range: mapper.range_to_original(selection.range),
        parent: selection
            .parent
            .map(|parent| Box::new(map_selection_range_to_original(mapper, *parent))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::mapping::Fragment;
    use tower_lsp::lsp_types::{
        AnnotatedTextEdit, CodeActionKind, CompletionItemKind, HoverContents, MarkedString,
        OptionalVersionedTextDocumentIdentifier,
    };

    fn fragment() -> Fragment {
        let doc = Document::new(
            Url::parse("file:///App.svelte").unwrap(),
            "<p>x</p>\n<style>\na {\n  color: red;\n}\n</style>",
            0,
        );
        let tag = doc.style_info().unwrap().clone();
        Fragment::from_tag(&doc, &tag)
    }

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Range {
        Range::new(Position::new(sl, sc), Position::new(el, ec))
    }

    #[test]
    fn hover_keeps_contents() {
        let f = fragment();
        let hover = Hover {
            contents: HoverContents::Scalar(MarkedString::String("color".into())),
            range: Some(range(2, 2, 2, 7)),
        };
        let mapped = map_hover_to_original(f.mapper(), hover.clone());
        assert_eq!(mapped.contents, hover.contents);
        assert_eq!(mapped.range, Some(range(3, 2, 3, 7)));
    }

    #[test]
    fn completion_edit_round_trips() {
        let f = fragment();
        let item = CompletionItem {
            label: "color".into(),
            kind: Some(CompletionItemKind::PROPERTY),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: range(2, 2, 2, 4),
                new_text: "color".into(),
            })),
            ..Default::default()
        };
        let up = map_completion_item_to_original(f.mapper(), item.clone());
        match &up.text_edit {
            Some(CompletionTextEdit::Edit(edit)) => assert_eq!(edit.range, range(3, 2, 3, 4)),
            other => panic!("unexpected edit {other:?}"),
        }
        assert_eq!(up.label, item.label);
        assert_eq!(up.kind, item.kind);

        let down = map_completion_item_to_generated(f.mapper(), up);
        assert_eq!(down, item);
    }

    #[test]
    fn foreign_link_targets_are_untouched() {
        let f = fragment();
        let other = Url::parse("file:///Other.svelte").unwrap();
        let link = LocationLink {
            origin_selection_range: Some(range(2, 0, 2, 1)),
            target_uri: other.clone(),
            target_range: range(0, 0, 0, 5),
            target_selection_range: range(0, 0, 0, 5),
        };
        let mapped = map_location_link_to_original(f.mapper(), link);
        assert_eq!(mapped.origin_selection_range, Some(range(3, 0, 3, 1)));
        assert_eq!(mapped.target_range, range(0, 0, 0, 5));

        let local = LocationLink {
            origin_selection_range: None,
            target_uri: Url::parse("file:///App.svelte").unwrap(),
            target_range: range(1, 0, 1, 1),
            target_selection_range: range(1, 0, 1, 1),
        };
        let mapped = map_location_link_to_original(f.mapper(), local);
        assert_eq!(mapped.target_range, range(2, 0, 2, 1));
    }

    #[test]
    fn code_action_edits_and_diagnostics_are_mapped() {
        let f = fragment();
        let uri = Url::parse("file:///App.svelte").unwrap();
        let action = CodeAction {
            title: "fix".into(),
            kind: Some(CodeActionKind::QUICKFIX),
            diagnostics: Some(vec![Diagnostic {
                range: range(1, 0, 1, 1),
                message: "m".into(),
                ..Default::default()
            }]),
            edit: Some(WorkspaceEdit {
                changes: Some(HashMap::from([(
                    uri.clone(),
                    vec![TextEdit {
                        range: range(1, 0, 3, 1),
                        new_text: String::new(),
                    }],
                )])),
                document_changes: Some(DocumentChanges::Edits(vec![TextDocumentEdit {
                    text_document: OptionalVersionedTextDocumentIdentifier {
                        uri: uri.clone(),
                        version: None,
                    },
                    edits: vec![OneOf::Right(AnnotatedTextEdit {
                        text_edit: TextEdit {
                            range: range(2, 2, 2, 7),
                            new_text: "background".into(),
                        },
                        annotation_id: "a".into(),
                    })],
                }])),
                change_annotations: None,
            }),
            ..Default::default()
        };

        let mapped = map_code_action_to_original(f.mapper(), action);
        assert_eq!(mapped.diagnostics.unwrap()[0].range, range(2, 0, 2, 1));
        let edit = mapped.edit.unwrap();
        assert_eq!(edit.changes.unwrap()[&uri][0].range, range(2, 0, 4, 1));
        match edit.document_changes {
            Some(DocumentChanges::Edits(edits)) => match &edits[0].edits[0] {
                OneOf::Right(annotated) => {
                    assert_eq!(annotated.text_edit.range, range(3, 2, 3, 7));
                    assert_eq!(annotated.annotation_id, "a");
                }
                other => panic!("unexpected edit {other:?}"),
            },
            other => panic!("unexpected changes {other:?}"),
        }
    }

    #[test]
    fn selection_range_parents_are_mapped() {
        let f = fragment();
        let selection = SelectionRange {
            range: range(2, 2, 2, 7),
            parent: Some(Box::new(SelectionRange {
                range: range(1, 0, 3, 1),
                parent: None,
            })),
        };
        let mapped = map_selection_range_to_original(f.mapper(), selection);
        assert_eq!(mapped.range, range(3, 2, 3, 7));
        assert_eq!(mapped.parent.unwrap().range, range(2, 0, 4, 1));
    }

    #[test]
    fn folding_lines_are_shifted() {
        let f = fragment();
        let folding = FoldingRange {
            start_line: 1,
            end_line: 3,
            ..Default::default()
        };
        let mapped = map_folding_range_to_original(f.mapper(), folding);
        assert_eq!((mapped.start_line, mapped.end_line), (2, 4));
        assert_eq!(mapped.start_character, None);
    }
}

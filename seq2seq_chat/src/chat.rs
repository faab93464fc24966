use crate::error::Result;
use crate::inference::Responder;
use log::warn;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// 1行の入力に対する処理結果
#[derive(Debug, PartialEq)]
pub enum ChatTurn {
    Skip,
    Quit,
    Reply(String),
}

/// 入力1行を処理（空行は無視、quit/exitで終了）
pub fn handle_line(responder: &dyn Responder, line: &str) -> ChatTurn {
    let line = line.trim();
    if line.is_empty() {
        return ChatTurn::Skip;
    }
    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        return ChatTurn::Quit;
    }
    ChatTurn::Reply(responder.respond(line))
}

/// 対話型チャット（REPL）
pub struct ChatSession<'a> {
    editor: DefaultEditor,
    responder: &'a dyn Responder,
}

impl<'a> ChatSession<'a> {
    pub fn new(responder: &'a dyn Responder) -> Result<Self> {
        let editor = DefaultEditor::new()?;
        Ok(Self { editor, responder })
    }

    pub fn run(&mut self) -> Result<()> {
        println!("===== チャット =====");
        println!("質問を入力してください（quit または Ctrl-D で終了）\n");

        loop {
            match self.editor.readline("you> ") {
                Ok(line) => match handle_line(self.responder, &line) {
                    ChatTurn::Skip => continue,
                    ChatTurn::Quit => break,
                    ChatTurn::Reply(reply) => {
                        if let Err(e) = self.editor.add_history_entry(line.trim()) {
                            warn!("履歴に追加できません: {}", e);
                        }
                        println!("bot> {}", reply);
                    }
                },
                Err(ReadlineError::Interrupted) => {
                    println!("終了するには quit または Ctrl-D を入力してください");
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        println!("終了します");
        Ok(())
    }
}

//! 编排器端到端测试：进程内后端 + 暂停的 tokio 时钟

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chronicle::api::{GameBackend, MockBackend};
    use chronicle::core::{
        create_game, Badge, Command, GameError, GameOptions, Screen, SessionContext, StageView,
        UiState,
    };
    use chronicle::narrator::SubmitKeyRequest;
    use tokio::sync::{mpsc, watch};

    struct Client {
        cmd: mpsc::UnboundedSender<Command>,
        state: watch::Receiver<UiState>,
    }

    impl Client {
        fn start(backend: Arc<MockBackend>) -> (Self, tokio::task::JoinHandle<()>) {
            let session = SessionContext::new(1, "traveler", "traveler@example.com", 0);
            let (cmd, state, handle) = create_game(backend, session, GameOptions::default());
            (Self { cmd, state }, handle)
        }

        fn send(&self, cmd: Command) {
            self.cmd.send(cmd).unwrap();
        }

        async fn until<F: FnMut(&UiState) -> bool>(&mut self, pred: F) -> UiState {
            tokio::time::timeout(Duration::from_secs(120), self.state.wait_for(pred))
                .await
                .expect("timed out waiting for state")
                .expect("game loop ended")
                .clone()
        }

        async fn stage(&mut self) -> StageView {
            let state = self.until(|s| s.level.is_some()).await;
            state.level.unwrap().stage
        }

        /// 逐行推进直到进入钥匙输入
        async fn read_dialogue(&mut self) {
            loop {
                let state = self
                    .until(|s| match s.level.as_ref().map(|l| &l.stage) {
                        Some(StageView::Chat { next_label, .. }) => next_label.is_some(),
                        Some(StageView::KeyEntry { .. }) => true,
                        _ => false,
                    })
                    .await;
                if let Some(StageView::KeyEntry { .. }) = state.level.map(|l| l.stage) {
                    return;
                }
                self.send(Command::Next);
                // 等待当前行离开「已揭示」状态，避免重复发送
                self.until(|s| {
                    !matches!(
                        s.level.as_ref().map(|l| &l.stage),
                        Some(StageView::Chat { next_label: Some(_), .. })
                    )
                })
                .await;
            }
        }

        async fn submit(&mut self, key: &str) {
            self.send(Command::SetKey(key.to_string()));
            self.send(Command::SubmitKey);
        }
    }

    fn key_error(state: &UiState) -> Option<String> {
        match state.level.as_ref().map(|l| &l.stage) {
            Some(StageView::KeyEntry {
                error, submitting, ..
            }) if !submitting => error.clone(),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_level_flow() {
        let backend = Arc::new(MockBackend::campaign());
        let (mut client, handle) = Client::start(backend.clone());

        client.until(|s| s.book.total == 5).await;
        client.send(Command::OpenBook);
        client.until(|s| s.book.open).await;

        // 未完成任何关卡时第二关锁定
        client.send(Command::FlipNext);
        let state = client
            .until(|s| s.book.page == 1 && s.book.flip.is_none())
            .await;
        assert_eq!(state.book.right.as_ref().map(|p| p.badge), Some(Badge::Locked));
        assert!(!state.book.can_enter);
        client.send(Command::EnterLevel);
        let state = client.until(|s| s.notice.is_some()).await;
        assert_eq!(state.screen, Screen::Book);

        client.send(Command::FlipPrev);
        client
            .until(|s| s.book.page == 0 && s.book.flip.is_none())
            .await;
        client.send(Command::EnterLevel);
        let state = client.until(|s| s.screen == Screen::Level).await;
        let level = state.level.unwrap();
        assert_eq!(level.title, "The Pyramids of Giza");

        client.read_dialogue().await;
        assert_eq!(
            client.until(|s| s.level.as_ref().is_some_and(|l| l.npc_name == "Sphinx Guardian")).await.screen,
            Screen::Level
        );

        // 空钥匙：本地校验，不发请求
        client.send(Command::SubmitKey);
        let state = client.until(|s| key_error(s).is_some()).await;
        assert_eq!(key_error(&state).as_deref(), Some("Enter the key word first."));
        assert_eq!(backend.submit_count().await, 0);

        client.submit("SPHINX").await;
        let state = client
            .until(|s| key_error(s).as_deref() == Some("Incorrect key"))
            .await;
        assert_eq!(state.credits, 0);

        client.submit("  human ").await;
        let state = client
            .until(|s| matches!(s.level.as_ref().map(|l| &l.stage), Some(StageView::Done { .. })))
            .await;
        assert_eq!(state.credits, 25);
        match state.level.unwrap().stage {
            StageView::Done {
                summary,
                continue_label,
                ..
            } => {
                assert_eq!(summary, "You earned +25 credits.");
                assert_eq!(continue_label, "Next Level →");
            }
            other => panic!("unexpected stage {:?}", other),
        }
        assert_eq!(backend.submit_count().await, 2);

        // 继续：回到书页、刷新进度、直接进入第二关
        client.send(Command::Continue);
        let state = client
            .until(|s| s.level.as_ref().is_some_and(|l| l.level_id == 2))
            .await;
        assert_eq!(state.level.unwrap().title, "The Nile River");
        assert_eq!(state.screen, Screen::Level);

        client.send(Command::BackToBook);
        let state = client
            .until(|s| {
                s.screen == Screen::Book
                    && s.book.right.as_ref().map(|p| p.badge) == Some(Badge::KeyCollected)
            })
            .await;
        assert_eq!(state.credits, 25);

        client.send(Command::Quit);
        handle.await.unwrap();
        assert!(client.state.borrow().quitting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_level_finishes_on_book() {
        let backend = Arc::new(MockBackend::campaign());
        for (level_id, key) in [(1, "HUMAN"), (2, "NILE"), (3, "PHARAOH"), (4, "KARNAK")] {
            let req = SubmitKeyRequest {
                user_id: 1,
                key: key.to_string(),
            };
            assert!(backend.submit_key(level_id, &req).await.unwrap().correct);
        }
        let (mut client, handle) = Client::start(backend.clone());
        client.until(|s| s.book.total == 5).await;
        client.send(Command::OpenBook);
        client.until(|s| s.book.open).await;

        client.send(Command::SelectLevel(5));
        client.until(|s| s.screen == Screen::Level).await;
        client.read_dialogue().await;
        client.submit("chronos").await;
        let state = client
            .until(|s| matches!(s.level.as_ref().map(|l| &l.stage), Some(StageView::Done { .. })))
            .await;
        assert_eq!(state.credits, 160);
        match state.level.unwrap().stage {
            StageView::Done { continue_label, .. } => assert_eq!(continue_label, "Finish"),
            other => panic!("unexpected stage {:?}", other),
        }

        client.send(Command::Continue);
        let state = client.until(|s| s.screen == Screen::Book).await;
        assert!(state.level.is_none());

        client.send(Command::Quit);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_backend() {
        let backend = Arc::new(MockBackend::campaign());
        backend.fail_dialogue(true).await;
        let (mut client, handle) = Client::start(backend.clone());
        client.until(|s| s.book.total == 5).await;
        client.send(Command::OpenBook);
        client.send(Command::EnterLevel);

        // 对话拉取失败：降级为无对话，不阻塞返回书页
        let stage = {
            let state = client
                .until(|s| {
                    matches!(
                        s.level.as_ref().map(|l| &l.stage),
                        Some(StageView::NoDialogue)
                    )
                })
                .await;
            state.level.unwrap().stage
        };
        assert_eq!(stage, StageView::NoDialogue);
        client.send(Command::BackToBook);
        client.until(|s| s.screen == Screen::Book).await;

        // 提交时网络失败：显示错误，可直接重试
        backend.fail_dialogue(false).await;
        backend
            .push_submit_error(GameError::Transport("connection refused".into()))
            .await;
        client.send(Command::EnterLevel);
        client.until(|s| s.screen == Screen::Level).await;
        client.read_dialogue().await;
        client.submit("HUMAN").await;
        let state = client.until(|s| key_error(s).is_some()).await;
        assert_eq!(key_error(&state).as_deref(), Some("connection refused"));

        client.send(Command::SubmitKey);
        client
            .until(|s| matches!(s.level.as_ref().map(|l| &l.stage), Some(StageView::Done { .. })))
            .await;
        assert_eq!(backend.submit_count().await, 2);

        client.send(Command::Quit);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_during_submission_still_syncs_credits() {
        let backend = Arc::new(MockBackend::campaign());
        backend.set_submit_delay(Duration::from_secs(2)).await;
        let (mut client, handle) = Client::start(backend.clone());
        client.until(|s| s.book.total == 5).await;
        client.send(Command::OpenBook);
        client.send(Command::EnterLevel);
        client.until(|s| s.screen == Screen::Level).await;
        client.read_dialogue().await;

        client.submit("HUMAN").await;
        client
            .until(|s| {
                matches!(
                    s.level.as_ref().map(|l| &l.stage),
                    Some(StageView::KeyEntry { submitting: true, .. })
                )
            })
            .await;
        client.send(Command::BackToBook);
        let state = client.until(|s| s.screen == Screen::Book).await;
        assert_eq!(state.credits, 0);

        // 服务端已记账：积分与徽章在结果到达后同步
        let state = client
            .until(|s| {
                s.credits == 25
                    && s.book.right.as_ref().map(|p| p.badge) == Some(Badge::KeyCollected)
            })
            .await;
        assert_eq!(state.screen, Screen::Book);
        assert!(state.level.is_none());
        assert_eq!(backend.submit_count().await, 1);

        client.send(Command::Quit);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_deck_and_progress() {
        let backend = Arc::new(MockBackend::campaign());
        let req = SubmitKeyRequest {
            user_id: 1,
            key: "HUMAN".to_string(),
        };
        assert!(backend.submit_key(1, &req).await.unwrap().correct);
        let (mut client, handle) = Client::start(backend.clone());
        client.send(Command::OpenBook);
        client
            .until(|s| {
                s.book.total == 5
                    && s.book.right.as_ref().map(|p| p.badge) == Some(Badge::KeyCollected)
            })
            .await;

        backend.fail_levels(true).await;
        backend.fail_progress(true).await;
        client.send(Command::Refresh);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let state = client.state.borrow().clone();
        assert_eq!(state.book.total, 5);
        assert_eq!(
            state.book.right.as_ref().map(|p| p.badge),
            Some(Badge::KeyCollected)
        );
        assert!(state.book.can_enter);

        // 恢复后再次刷新能拿到新增的关卡
        backend.fail_levels(false).await;
        backend.fail_progress(false).await;
        backend
            .add_level(6, "The Lost Library", "SCROLL", 50, Vec::new())
            .await;
        client.send(Command::Refresh);
        let state = client.until(|s| s.book.total == 6).await;
        assert_eq!(
            state.book.right.as_ref().map(|p| p.badge),
            Some(Badge::KeyCollected)
        );

        client.send(Command::Quit);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_during_load_ignores_late_dialogue() {
        let backend = Arc::new(MockBackend::campaign());
        backend.set_dialogue_delay(Duration::from_secs(5)).await;
        let (mut client, handle) = Client::start(backend.clone());
        client.until(|s| s.book.total == 5).await;
        client.send(Command::OpenBook);
        client.send(Command::EnterLevel);
        assert_eq!(client.stage().await, StageView::Loading);

        client.send(Command::BackToBook);
        client.until(|s| s.screen == Screen::Book).await;

        // 迟到的对话不会把界面拉回关卡
        tokio::time::sleep(Duration::from_secs(10)).await;
        let state = client.state.borrow().clone();
        assert_eq!(state.screen, Screen::Book);
        assert!(state.level.is_none());

        client.send(Command::Quit);
        handle.await.unwrap();
    }
}
